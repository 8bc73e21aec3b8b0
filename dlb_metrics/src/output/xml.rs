//! Deprecated XML output writer, kept for compatibility with older
//! tooling that still parses it.
//!
//! No schema validation; a hand-rolled, minimally-escaped tree mirroring
//! the JSON writer's field names.

use crate::error::{MetricsError, MetricsResult};
use crate::report::Report;
use std::fmt::Write as _;
use std::path::Path;

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render `report` as an XML document.
pub fn render(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(out, "<dlbReport>");
    let _ = writeln!(out, "  <dlbVersion>{}</dlbVersion>", escape(&report.dlb_version));
    let _ = writeln!(out, "  <dlbGitVersion>{}</dlbGitVersion>", escape(&report.dlb_git_version));
    let _ = writeln!(out, "  <timestamp>{}</timestamp>", escape(&report.timestamp));
    let _ = writeln!(out, "  <resources>");
    let _ = writeln!(out, "    <numCpus>{}</numCpus>", report.resources.num_cpus);
    let _ = writeln!(out, "    <numNodes>{}</numNodes>", report.resources.num_nodes);
    let _ = writeln!(out, "    <numMpiRanks>{}</numMpiRanks>", report.resources.num_mpi_ranks);
    let _ = writeln!(out, "  </resources>");

    let _ = writeln!(out, "  <popMetrics>");
    for (name, metrics) in &report.pop_metrics {
        let _ = writeln!(out, r#"    <region name="{}">"#, escape(name));
        let _ = writeln!(out, "      <parallelEfficiency>{}</parallelEfficiency>", metrics.parallel_efficiency);
        let _ = writeln!(
            out,
            "      <mpiParallelEfficiency>{}</mpiParallelEfficiency>",
            metrics.mpi_parallel_efficiency
        );
        let _ = writeln!(
            out,
            "      <mpiCommunicationEfficiency>{}</mpiCommunicationEfficiency>",
            metrics.mpi_communication_efficiency
        );
        let _ = writeln!(out, "      <mpiLoadBalance>{}</mpiLoadBalance>", metrics.mpi_load_balance);
        let _ = writeln!(out, "    </region>");
    }
    let _ = writeln!(out, "  </popMetrics>");

    let _ = writeln!(out, "  <nodes>");
    for node in &report.node {
        let _ = writeln!(out, r#"    <node id="{}">"#, node.node_id);
        for process in &node.process {
            let _ = writeln!(
                out,
                r#"      <process rank="{}" usefulTime="{}" mpiTime="{}"/>"#,
                process.rank, process.useful_time, process.mpi_time
            );
        }
        let _ = writeln!(out, "    </node>");
    }
    let _ = writeln!(out, "  </nodes>");

    let _ = writeln!(out, "</dlbReport>");
    out
}

/// Write `report`'s XML rendering to `path`.
pub fn write(report: &Report, path: &Path) -> MetricsResult<()> {
    std::fs::write(path, render(report)).map_err(|source| MetricsError::Write {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn render_escapes_region_names() {
        let mut report = Report::default();
        report
            .pop_metrics
            .insert("A & B".to_string(), Default::default());
        let xml = render(&report);
        assert!(xml.contains("A &amp; B"));
    }

    #[test]
    fn write_creates_file_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xml");
        write(&Report::default(), &path).unwrap();
        assert!(path.exists());
    }
}
