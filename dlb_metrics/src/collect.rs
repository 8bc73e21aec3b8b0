//! Wires [`dlb_talp::TalpProcess`] region snapshots into the reduction and
//! POP-metrics pipeline: `collect_pop_metrics` (all-to-all) and
//! `collect_pop_node_metrics`/`query_pop_node_metrics` (node-barrier or
//! shared-registry backed).
//!
//! `dlb_talp` knows no MPI types, so the all-to-all reduction itself is a
//! caller-supplied closure — typically one the host's MPI collaborator
//! implements as `MPI_Allreduce` with a custom op built from
//! [`crate::reduce::app_reduce`].

use crate::base::BaseMetrics;
use crate::pop::{self, NodePopMetrics, PopMetrics};
use crate::reduce::{app_from_base, node_from_base, AppAggregate, NodeAggregate};
use dlb_common::config::TalpModel;
use dlb_talp::{RegionId, TalpError, TalpProcess, TalpResult};

/// `collect_pop_metrics(handle)`: snapshot `handle` on this process,
/// reduce it across the application via `allreduce`, and compute the POP
/// metrics for `model`.
///
/// `allreduce` stands in for the all-to-all `MPI_Allreduce` the original
/// performs: given this process's singleton [`AppAggregate`], it returns
/// the fully-reduced application-wide one. A single-process caller (no
/// MPI collaborator attached) can pass the identity closure.
pub fn collect_pop_metrics<F>(
    process: &TalpProcess,
    handle: RegionId,
    model: TalpModel,
    allreduce: F,
) -> PopMetrics
where
    F: FnOnce(AppAggregate) -> AppAggregate,
{
    let snapshot = process.report(handle);
    let base = BaseMetrics::from_snapshot(&snapshot, process.get_num_cpus() as f64, 0);
    let node = node_from_base(&base);
    let local = app_from_base(&base, &node);
    pop::compute(model, &allreduce(local))
}

/// `collect_pop_node_metrics(handle)`: same as [`collect_pop_metrics`] but
/// reduced only over the node-local communicator, requiring the caller to
/// have already crossed the node barrier so every sibling's snapshot is
/// final.
pub fn collect_pop_node_metrics<F>(
    process: &TalpProcess,
    handle: RegionId,
    model: TalpModel,
    node_reduce_fn: F,
) -> PopMetrics
where
    F: FnOnce(NodeAggregate) -> NodeAggregate,
{
    let snapshot = process.report(handle);
    let base = BaseMetrics::from_snapshot(&snapshot, process.get_num_cpus() as f64, 0);
    let node = node_reduce_fn(node_from_base(&base));
    let app = app_from_base(&base, &node);
    pop::compute(model, &app)
}

/// `query_pop_node_metrics(name)`: the simpler MPI-only node model,
/// answered entirely out of the shared TALP region registry — no
/// in-process reduction callback needed, since every sibling on the node
/// already mirrors its times there when `talp-external-profiler=yes`.
pub fn query_pop_node_metrics(process: &TalpProcess, name: &str) -> TalpResult<NodePopMetrics> {
    let times = process.get_node_times(name)?;
    if times.is_empty() {
        return Err(TalpError::NoSuchRegion(name.to_string()));
    }
    let node_sum_useful: i64 = times.iter().map(|(_, _, useful)| useful).sum();
    let node_sum_mpi: i64 = times.iter().map(|(_, mpi, _)| mpi).sum();
    let max_useful_time = times.iter().map(|(_, _, useful)| *useful).max().unwrap_or(0);
    Ok(pop::compute_mpi_only_node_model(
        node_sum_useful,
        node_sum_mpi,
        times.len() as u32,
        max_useful_time,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlb_talp::RegionFilter;

    #[test]
    fn collect_pop_metrics_with_identity_reduction_matches_single_process() {
        let process = TalpProcess::new(RegionFilter::AllowAll, false, "", 1);
        let region = process.register("R").unwrap();
        process.start(region).unwrap();
        std::thread::sleep(std::time::Duration::from_micros(100));
        process.stop(region).unwrap();

        let metrics = collect_pop_metrics(&process, region, TalpModel::HybridV2, |local| local);
        assert!(metrics.parallel_efficiency > 0.0);
    }

    #[test]
    fn query_pop_node_metrics_errors_without_shared_registry_entries() {
        let process = TalpProcess::new(RegionFilter::AllowAll, true, "collect_test_nonexistent", 1);
        process.attach().unwrap();
        let err = query_pop_node_metrics(&process, "NeverRegistered").unwrap_err();
        assert!(matches!(err, TalpError::NoSuchRegion(_)));
    }
}
