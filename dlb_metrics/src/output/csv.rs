//! CSV output writer.
//!
//! No CSV crate is part of this workspace's dependency stack, so this is
//! a minimal hand-rolled writer rather than an added dependency.
//!
//! When more than one record kind (`pop`, `node`, `process`) is present in
//! the report, output is split into `<base>-pop.csv`, `<base>-node.csv`,
//! `<base>-process.csv` next to the configured path. When only one kind is
//! present, it is written to the configured path directly. Either way, if
//! the target file already exists its header is not re-emitted — new rows
//! are appended.

use crate::error::{MetricsError, MetricsResult};
use crate::report::Report;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

fn target_path(base: &Path, splitting: bool, kind: &str) -> PathBuf {
    if !splitting {
        return base.to_path_buf();
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("talp");
    let name = format!("{stem}-{kind}.csv");
    match base.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn append_rows(path: &Path, header: &str, rows: &[String]) -> MetricsResult<()> {
    let existed = path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| MetricsError::Write { path: path.display().to_string(), source })?;
    if !existed {
        writeln!(file, "{header}").map_err(|source| MetricsError::Write {
            path: path.display().to_string(),
            source,
        })?;
    }
    for row in rows {
        writeln!(file, "{row}").map_err(|source| MetricsError::Write {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}

fn pop_rows(report: &Report) -> Vec<String> {
    report
        .pop_metrics
        .iter()
        .map(|(name, m)| {
            format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                name,
                m.parallel_efficiency,
                m.mpi_parallel_efficiency,
                m.mpi_communication_efficiency,
                m.mpi_load_balance,
                m.omp_parallel_efficiency,
                m.omp_load_balance,
                m.omp_scheduling_efficiency,
                m.omp_serialization_efficiency,
                m.device_offload_efficiency,
                m.gpu_parallel_efficiency,
                m.gpu_load_balance,
                m.gpu_communication_efficiency,
                m.gpu_orchestration_efficiency,
            )
        })
        .collect()
}

const POP_HEADER: &str = "region,parallelEfficiency,mpiParallelEfficiency,mpiCommunicationEfficiency,mpiLoadBalance,ompParallelEfficiency,ompLoadBalance,ompSchedulingEfficiency,ompSerializationEfficiency,deviceOffloadEfficiency,gpuParallelEfficiency,gpuLoadBalance,gpuCommunicationEfficiency,gpuOrchestrationEfficiency";

fn node_rows(report: &Report) -> Vec<String> {
    report
        .node
        .iter()
        .map(|n| format!("{},{},{},{}", n.node_id, n.process.len(), n.node_avg, n.node_max))
        .collect()
}

const NODE_HEADER: &str = "nodeId,numProcesses,nodeAvg,nodeMax";

fn process_rows(report: &Report) -> Vec<String> {
    report
        .region
        .iter()
        .flat_map(|(name, processes)| {
            processes
                .iter()
                .map(move |p| format!("{},{},{},{}", name, p.rank, p.useful_time, p.mpi_time))
        })
        .collect()
}

const PROCESS_HEADER: &str = "region,rank,usefulTime,mpiTime";

/// Write `report` as one or more CSV files rooted at `path`.
pub fn write(report: &Report, path: &Path) -> MetricsResult<()> {
    let kinds_present = [
        !report.pop_metrics.is_empty(),
        !report.node.is_empty(),
        !report.region.is_empty(),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    let splitting = kinds_present > 1;

    if !report.pop_metrics.is_empty() {
        append_rows(&target_path(path, splitting, "pop"), POP_HEADER, &pop_rows(report))?;
    }
    if !report.node.is_empty() {
        append_rows(&target_path(path, splitting, "node"), NODE_HEADER, &node_rows(report))?;
    }
    if !report.region.is_empty() {
        append_rows(&target_path(path, splitting, "process"), PROCESS_HEADER, &process_rows(report))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pop::PopMetrics;
    use crate::report::{NodeRecord, ProcessRecord};
    use tempfile::tempdir;

    #[test]
    fn single_kind_writes_directly_to_configured_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut report = Report::default();
        report.pop_metrics.insert("Global".to_string(), PopMetrics::default());

        write(&report, &path).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("out-pop.csv").exists());
    }

    #[test]
    fn multiple_kinds_split_into_suffixed_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut report = Report::default();
        report.pop_metrics.insert("Global".to_string(), PopMetrics::default());
        report.node.push(NodeRecord::from_processes(0, vec![ProcessRecord { rank: 0, useful_time: 1, mpi_time: 0 }]));

        write(&report, &path).unwrap();
        assert!(dir.path().join("out-pop.csv").exists());
        assert!(dir.path().join("out-node.csv").exists());
        assert!(!path.exists());
    }

    #[test]
    fn existing_file_is_appended_without_repeating_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut report = Report::default();
        report.pop_metrics.insert("Global".to_string(), PopMetrics::default());

        write(&report, &path).unwrap();
        write(&report, &path).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body.matches("region,parallelEfficiency").count(), 1);
        assert_eq!(body.matches("Global").count(), 2);
    }
}
