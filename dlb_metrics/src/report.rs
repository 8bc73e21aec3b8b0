//! The output record shape shared by every writer. JSON keys are canonical; the other formats mirror them.

use crate::pop::PopMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node/rank resource counts reported once per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    /// Total CPUs visible across the application.
    pub num_cpus: u32,
    /// Distinct nodes the application ran on.
    pub num_nodes: u32,
    /// Total MPI ranks.
    pub num_mpi_ranks: u32,
}

/// One process's useful/MPI time within a region, keyed by MPI rank.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    /// MPI rank (or pid, when no MPI communicator is available).
    pub rank: u32,
    /// Useful (compute) time, ns.
    pub useful_time: i64,
    /// MPI time, ns.
    pub mpi_time: i64,
}

/// Per-node breakdown: every process on the node plus its average and
/// maximum useful time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// Node identifier (stable within one run, not across runs).
    pub node_id: u32,
    /// Every process resident on this node.
    pub process: Vec<ProcessRecord>,
    /// Average useful time across `process`.
    pub node_avg: f64,
    /// Maximum useful time across `process`.
    pub node_max: i64,
}

/// The complete output record for one finalisation, covering every
/// monitoring region the run selected for the configured summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Library version (`CARGO_PKG_VERSION` of the host application).
    pub dlb_version: String,
    /// Git revision the host application was built from, if known.
    pub dlb_git_version: String,
    /// ISO-8601 timestamp of finalisation.
    pub timestamp: String,
    /// Resource counts for the run.
    pub resources: Resources,
    /// POP efficiency metrics, keyed by region name.
    pub pop_metrics: BTreeMap<String, PopMetrics>,
    /// Per-node process breakdowns.
    pub node: Vec<NodeRecord>,
    /// Per-rank process snapshots, keyed by region name.
    pub region: BTreeMap<String, Vec<ProcessRecord>>,
}

impl NodeRecord {
    /// Build a node record from its processes, computing `node_avg` and
    /// `node_max` from their `useful_time`.
    pub fn from_processes(node_id: u32, process: Vec<ProcessRecord>) -> Self {
        let node_max = process.iter().map(|p| p.useful_time).max().unwrap_or(0);
        let node_avg = if process.is_empty() {
            0.0
        } else {
            process.iter().map(|p| p.useful_time as f64).sum::<f64>() / process.len() as f64
        };
        NodeRecord {
            node_id,
            process,
            node_avg,
            node_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_record_computes_avg_and_max() {
        let record = NodeRecord::from_processes(
            0,
            vec![
                ProcessRecord { rank: 0, useful_time: 100, mpi_time: 10 },
                ProcessRecord { rank: 1, useful_time: 200, mpi_time: 20 },
            ],
        );
        assert_eq!(record.node_max, 200);
        assert_eq!(record.node_avg, 150.0);
    }

    #[test]
    fn node_record_handles_empty_process_list() {
        let record = NodeRecord::from_processes(0, vec![]);
        assert_eq!(record.node_max, 0);
        assert_eq!(record.node_avg, 0.0);
    }
}
