//! Node and application reductions, reified as pure, associative,
//! commutative combine functions over [`BaseMetrics`].
//!
//! The core knows no MPI types. An external MPI collaborator registers
//! these as the element-wise body of a custom `MPI_Op` and drives the
//! actual `MPI_Reduce`/`MPI_Allreduce` calls; everything here is ordinary,
//! testable Rust.

use crate::base::BaseMetrics;

/// Intra-node reduction result (custom op over the node-local
/// communicator): aggregated CPU count and MPI time, available in full
/// only at the node leader once every intra-node rank has been folded in.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeAggregate {
    /// Sum of `num_cpus` across every process on the node.
    pub num_cpus_in_node: f64,
    /// Sum of `mpi_time` across every process on the node.
    pub mpi_time: i64,
    /// `true` once at least one real [`BaseMetrics`] has been folded in;
    /// distinguishes a genuine all-zero aggregate from the reduction
    /// identity.
    pub used: bool,
}

/// The identity element for [`node_reduce`]: folding it with any
/// [`NodeAggregate`] returns that aggregate unchanged.
pub fn node_identity() -> NodeAggregate {
    NodeAggregate::default()
}

/// Seed a singleton node aggregate from one process's base metrics.
pub fn node_from_base(base: &BaseMetrics) -> NodeAggregate {
    NodeAggregate {
        num_cpus_in_node: base.num_cpus,
        mpi_time: base.mpi_time,
        used: true,
    }
}

/// Combine two node aggregates. Commutative and associative, suitable for
/// a tree or ring `MPI_Reduce`.
pub fn node_reduce(a: NodeAggregate, b: NodeAggregate) -> NodeAggregate {
    NodeAggregate {
        num_cpus_in_node: a.num_cpus_in_node + b.num_cpus_in_node,
        mpi_time: a.mpi_time + b.mpi_time,
        used: a.used || b.used,
    }
}

/// Application-wide reduction result (custom op over the world
/// communicator): additive fields summed, `elapsed`/GPU-max fields
/// maxed, and the two normalized-MPI-time minimums taken with the
/// non-zero rule.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AppAggregate {
    /// Number of processes folded into this aggregate.
    pub num_procs: u32,
    /// Number of distinct nodes represented (only well-defined once every
    /// process's [`NodeAggregate::used`] has round-tripped back to it).
    pub num_nodes: u32,
    /// Sum of `num_cpus` across every process in the application.
    pub num_cpus: f64,
    /// Highest `num_gpus` reported by any process.
    pub num_gpus: u32,
    /// Sum of `useful_time`.
    pub sum_useful_time: i64,
    /// Sum of `mpi_time`.
    pub sum_mpi_time: i64,
    /// Sum of `omp_load_imbalance_time`.
    pub sum_omp_load_imbalance_time: i64,
    /// Sum of `omp_scheduling_time`.
    pub sum_omp_scheduling_time: i64,
    /// Sum of `omp_serialization_time`.
    pub sum_omp_serialization_time: i64,
    /// Sum of `gpu_runtime_time`.
    pub sum_gpu_runtime_time: i64,
    /// Sum of `gpu_useful_time`.
    pub sum_gpu_useful_time: i64,
    /// Sum of `gpu_communication_time`.
    pub sum_gpu_communication_time: i64,
    /// Maximum `elapsed_time` across every process.
    pub max_elapsed_time: i64,
    /// Maximum `max_gpu_useful_time` across every process.
    pub max_gpu_useful_time: i64,
    /// Maximum `max_gpu_active_time` across every process.
    pub max_gpu_active_time: i64,
    /// Minimum process-normalized MPI time, ignoring processes that
    /// reported exactly zero (the non-zero rule: a still-idle process
    /// with `mpi_time == 0` must not make the whole application look
    /// communication-free).
    pub min_mpi_normd_proc: i64,
    /// Minimum node-normalized MPI time, same non-zero rule, computed
    /// from each process's own node's [`NodeAggregate`].
    pub min_mpi_normd_node: i64,
}

/// The identity element for [`app_reduce`].
pub fn app_identity() -> AppAggregate {
    AppAggregate::default()
}

fn min_nonzero(a: i64, b: i64) -> i64 {
    match (a == 0, b == 0) {
        (true, true) => 0,
        (true, false) => b,
        (false, true) => a,
        (false, false) => a.min(b),
    }
}

/// Seed a singleton application aggregate from one process's base
/// metrics and the [`NodeAggregate`] its node reduced to (used to derive
/// `min_mpi_normd_node`).
pub fn app_from_base(base: &BaseMetrics, node: &NodeAggregate) -> AppAggregate {
    let mpi_normd_node = if node.num_cpus_in_node > 0.0 {
        (node.mpi_time as f64 / node.num_cpus_in_node) as i64
    } else {
        node.mpi_time
    };
    AppAggregate {
        num_procs: 1,
        num_nodes: 1,
        num_cpus: base.num_cpus,
        num_gpus: base.num_gpus,
        sum_useful_time: base.useful_time,
        sum_mpi_time: base.mpi_time,
        sum_omp_load_imbalance_time: base.omp_load_imbalance_time,
        sum_omp_scheduling_time: base.omp_scheduling_time,
        sum_omp_serialization_time: base.omp_serialization_time,
        sum_gpu_runtime_time: base.gpu_runtime_time,
        sum_gpu_useful_time: base.gpu_useful_time,
        sum_gpu_communication_time: base.gpu_communication_time,
        max_elapsed_time: base.elapsed_time,
        max_gpu_useful_time: base.max_gpu_useful_time,
        max_gpu_active_time: base.max_gpu_active_time,
        min_mpi_normd_proc: base.mpi_normd_proc(),
        min_mpi_normd_node: mpi_normd_node,
    }
}

/// Combine two application aggregates. Commutative and associative.
///
/// `num_nodes` is summed here under the assumption each input already
/// represents a distinct node's contribution (the collaborator folds one
/// [`AppAggregate`] per node-leader, each built by first folding every
/// rank on that node together via [`app_reduce`] and dividing the
/// resulting `num_nodes` back to 1 — see tests for the two-stage pattern).
pub fn app_reduce(a: AppAggregate, b: AppAggregate) -> AppAggregate {
    AppAggregate {
        num_procs: a.num_procs + b.num_procs,
        num_nodes: a.num_nodes + b.num_nodes,
        num_cpus: a.num_cpus + b.num_cpus,
        num_gpus: a.num_gpus.max(b.num_gpus),
        sum_useful_time: a.sum_useful_time + b.sum_useful_time,
        sum_mpi_time: a.sum_mpi_time + b.sum_mpi_time,
        sum_omp_load_imbalance_time: a.sum_omp_load_imbalance_time + b.sum_omp_load_imbalance_time,
        sum_omp_scheduling_time: a.sum_omp_scheduling_time + b.sum_omp_scheduling_time,
        sum_omp_serialization_time: a.sum_omp_serialization_time + b.sum_omp_serialization_time,
        sum_gpu_runtime_time: a.sum_gpu_runtime_time + b.sum_gpu_runtime_time,
        sum_gpu_useful_time: a.sum_gpu_useful_time + b.sum_gpu_useful_time,
        sum_gpu_communication_time: a.sum_gpu_communication_time + b.sum_gpu_communication_time,
        max_elapsed_time: a.max_elapsed_time.max(b.max_elapsed_time),
        max_gpu_useful_time: a.max_gpu_useful_time.max(b.max_gpu_useful_time),
        max_gpu_active_time: a.max_gpu_active_time.max(b.max_gpu_active_time),
        min_mpi_normd_proc: min_nonzero(a.min_mpi_normd_proc, b.min_mpi_normd_proc),
        min_mpi_normd_node: min_nonzero(a.min_mpi_normd_node, b.min_mpi_normd_node),
    }
}
