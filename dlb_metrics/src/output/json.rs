//! JSON output writer. `serde_json` pretty-printed; field names are the
//! canonical keys every other format mirrors.

use crate::error::{MetricsError, MetricsResult};
use crate::report::Report;
use std::path::Path;

/// Write `report` as pretty-printed JSON to `path`.
pub fn write(report: &Report, path: &Path) -> MetricsResult<()> {
    let body = serde_json::to_string_pretty(report)?;
    std::fs::write(path, body).map_err(|source| MetricsError::Write {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Resources;
    use tempfile::tempdir;

    #[test]
    fn writes_valid_json_with_canonical_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut report = Report::default();
        report.dlb_version = "1.0.0".to_string();
        report.resources = Resources { num_cpus: 4, num_nodes: 1, num_mpi_ranks: 2 };

        write(&report, &path).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["dlbVersion"], "1.0.0");
        assert_eq!(value["resources"]["numCpus"], 4);
    }
}
