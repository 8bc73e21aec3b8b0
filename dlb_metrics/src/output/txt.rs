//! Plain-text writer: the same rendering used both for `talp-output-file`
//! ending in `.txt`/anything unrecognised, and for the log-sink fallback
//! when no output file is configured.

use crate::error::{MetricsError, MetricsResult};
use crate::report::Report;
use std::fmt::Write as _;
use std::path::Path;

/// Render `report` as a human-readable multi-line string.
pub fn render(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "DLB {} ({})", report.dlb_version, report.dlb_git_version);
    let _ = writeln!(out, "timestamp: {}", report.timestamp);
    let _ = writeln!(
        out,
        "resources: {} cpus, {} nodes, {} mpi ranks",
        report.resources.num_cpus, report.resources.num_nodes, report.resources.num_mpi_ranks
    );

    if !report.pop_metrics.is_empty() {
        let _ = writeln!(out, "\nPOP metrics:");
        for (name, metrics) in &report.pop_metrics {
            let _ = writeln!(out, "  region \"{name}\":");
            let _ = writeln!(out, "    parallel efficiency:        {:.4}", metrics.parallel_efficiency);
            let _ = writeln!(out, "    MPI parallel efficiency:    {:.4}", metrics.mpi_parallel_efficiency);
            let _ = writeln!(out, "    MPI communication eff.:     {:.4}", metrics.mpi_communication_efficiency);
            let _ = writeln!(out, "    MPI load balance:           {:.4}", metrics.mpi_load_balance);
            let _ = writeln!(out, "    OMP parallel efficiency:    {:.4}", metrics.omp_parallel_efficiency);
            let _ = writeln!(out, "    OMP load balance:           {:.4}", metrics.omp_load_balance);
            let _ = writeln!(out, "    OMP scheduling efficiency:  {:.4}", metrics.omp_scheduling_efficiency);
            let _ = writeln!(out, "    OMP serialization eff.:     {:.4}", metrics.omp_serialization_efficiency);
            if metrics.gpu_parallel_efficiency != 0.0 {
                let _ = writeln!(out, "    GPU parallel efficiency:    {:.4}", metrics.gpu_parallel_efficiency);
            }
        }
    }

    if !report.node.is_empty() {
        let _ = writeln!(out, "\nNode summary:");
        for node in &report.node {
            let _ = writeln!(
                out,
                "  node {}: {} processes, avg useful {:.0} ns, max useful {} ns",
                node.node_id,
                node.process.len(),
                node.node_avg,
                node.node_max
            );
        }
    }

    if !report.region.is_empty() {
        let _ = writeln!(out, "\nPer-region process times:");
        for (name, processes) in &report.region {
            let _ = writeln!(out, "  region \"{name}\":");
            for process in processes {
                let _ = writeln!(
                    out,
                    "    rank {}: useful {} ns, mpi {} ns",
                    process.rank, process.useful_time, process.mpi_time
                );
            }
        }
    }

    out
}

/// Write `report`'s text rendering to `path`.
pub fn write(report: &Report, path: &Path) -> MetricsResult<()> {
    std::fs::write(path, render(report)).map_err(|source| MetricsError::Write {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pop::PopMetrics;
    use tempfile::tempdir;

    #[test]
    fn render_includes_region_metrics() {
        let mut report = Report::default();
        report.pop_metrics.insert(
            "Global".to_string(),
            PopMetrics { parallel_efficiency: 0.875, ..Default::default() },
        );
        let text = render(&report);
        assert!(text.contains("Global"));
        assert!(text.contains("0.8750"));
    }

    #[test]
    fn write_creates_file_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write(&Report::default(), &path).unwrap();
        assert!(path.exists());
    }
}
