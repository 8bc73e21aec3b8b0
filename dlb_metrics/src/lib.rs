//! # dlb_metrics
//!
//! Node/application reductions and POP (Performance Optimization and
//! Productivity) efficiency metrics over TALP's reduced base timers, plus
//! the JSON/XML/CSV/TXT output writers that render them.
//!
//! The core never links against MPI. [`base::BaseMetrics`] is what an
//! external MPI collaborator gathers from every process (typically via
//! [`dlb_talp::TalpProcess::report`]); [`reduce::node_reduce`] and
//! [`reduce::app_reduce`] are the pure, associative, commutative functions
//! that collaborator registers as custom `MPI_Op`s. [`pop::compute`] turns
//! the fully-reduced [`reduce::AppAggregate`] into the ratio family callers
//! actually want, and [`output::write_report`] renders a [`report::Report`]
//! in whichever format `talp-output-file`'s extension selects.
#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod base;
pub mod collect;
pub mod error;
pub mod output;
pub mod pop;
pub mod reduce;
pub mod report;

pub use base::BaseMetrics;
pub use collect::{collect_pop_metrics, collect_pop_node_metrics, query_pop_node_metrics};
pub use error::{MetricsError, MetricsResult};
pub use pop::{compute_mpi_only_node_model, NodePopMetrics, PopMetrics};
pub use reduce::{
    app_from_base, app_identity, app_reduce, node_from_base, node_identity, node_reduce, AppAggregate,
    NodeAggregate,
};
pub use report::{NodeRecord, ProcessRecord, Report, Resources};

/// Build an ISO-8601 timestamp for a [`report::Report`]. Backed by
/// `chrono`.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_iso8601_looks_like_rfc3339() {
        let stamp = now_iso8601();
        assert!(stamp.contains('T'));
        assert!(stamp.len() >= 20);
    }

    #[test]
    fn end_to_end_reduction_and_pop_computation() {
        use dlb_common::config::TalpModel;

        let rank0 = BaseMetrics {
            num_cpus: 4.0,
            num_gpus: 0,
            elapsed_time: 1_000_000,
            useful_time: 800_000,
            mpi_time: 200_000,
            omp_load_imbalance_time: 0,
            omp_scheduling_time: 0,
            omp_serialization_time: 0,
            gpu_runtime_time: 0,
            gpu_useful_time: 0,
            gpu_communication_time: 0,
            max_gpu_useful_time: 0,
            max_gpu_active_time: 0,
        };
        let rank1 = BaseMetrics {
            useful_time: 700_000,
            mpi_time: 300_000,
            ..rank0
        };

        let node0 = node_from_base(&rank0);
        let node1 = node_from_base(&rank1);
        let node = node_reduce(node0, node1);

        let app = app_reduce(app_from_base(&rank0, &node), app_from_base(&rank1, &node));
        let metrics = pop::compute(TalpModel::HybridV2, &app);

        assert!(metrics.parallel_efficiency > 0.0 && metrics.parallel_efficiency <= 1.0);
        assert!(metrics.mpi_parallel_efficiency > 0.0);
    }
}
