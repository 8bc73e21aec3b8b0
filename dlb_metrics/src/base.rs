//! Base metrics: the per-process timer set that feeds the node and
//! application reductions.
//!
//! The core never links against MPI. A [`BaseMetrics`] is a plain struct an
//! external MPI collaborator gathers from every process (via
//! [`dlb_talp::TalpProcess::report`]) and folds pairwise with
//! [`crate::reduce::node_reduce`] / [`crate::reduce::app_reduce`], the way
//! `MPI_Reduce` with a user-defined op would.

use dlb_talp::RegionSnapshot;

/// One process's contribution to a reduction: a region snapshot plus the
/// two pieces of process/node topology an external MPI collaborator
/// supplies (`num_cpus`, `num_gpus`) that don't live on the region itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseMetrics {
    /// CPUs visible to this process (`get_num_cpus`).
    pub num_cpus: f64,
    /// GPUs visible to this process; GPU ratios are gated on this being
    /// nonzero.
    pub num_gpus: u32,
    /// Wall time the region was open, summed across start/stop pairs, ns.
    pub elapsed_time: i64,
    /// Useful (compute) time, ns.
    pub useful_time: i64,
    /// MPI time, ns.
    pub mpi_time: i64,
    /// OpenMP load-imbalance time, ns.
    pub omp_load_imbalance_time: i64,
    /// OpenMP scheduling time, ns.
    pub omp_scheduling_time: i64,
    /// OpenMP serialization time, ns.
    pub omp_serialization_time: i64,
    /// GPU runtime-call time, ns.
    pub gpu_runtime_time: i64,
    /// GPU kernel-useful time, ns.
    pub gpu_useful_time: i64,
    /// GPU memory-copy (communication) time, ns.
    pub gpu_communication_time: i64,
    /// Running maximum of a single flush's GPU useful time, ns.
    pub max_gpu_useful_time: i64,
    /// Running maximum of a single flush's GPU useful-plus-communication
    /// time, ns.
    pub max_gpu_active_time: i64,
}

impl BaseMetrics {
    /// Build a [`BaseMetrics`] from a region snapshot plus the topology
    /// figures the host process already knows about itself.
    pub fn from_snapshot(snapshot: &RegionSnapshot, num_cpus: f64, num_gpus: u32) -> Self {
        BaseMetrics {
            num_cpus,
            num_gpus,
            elapsed_time: snapshot.elapsed_time,
            useful_time: snapshot.useful_time,
            mpi_time: snapshot.mpi_time,
            omp_load_imbalance_time: snapshot.omp_load_imbalance_time,
            omp_scheduling_time: snapshot.omp_scheduling_time,
            omp_serialization_time: snapshot.omp_serialization_time,
            gpu_runtime_time: snapshot.gpu_runtime_time,
            gpu_useful_time: snapshot.gpu_useful_time,
            gpu_communication_time: snapshot.gpu_communication_time,
            max_gpu_useful_time: snapshot.max_gpu_useful_time,
            max_gpu_active_time: snapshot.max_gpu_active_time,
        }
    }

    /// `mpi_time` normalized by this process's CPU count, the unit the
    /// hybrid-v2 formulas compare across processes.
    pub fn mpi_normd_proc(&self) -> i64 {
        if self.num_cpus > 0.0 {
            (self.mpi_time as f64 / self.num_cpus) as i64
        } else {
            self.mpi_time
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RegionSnapshot {
        RegionSnapshot {
            name: "R".to_string(),
            avg_cpus: 4.0,
            num_measurements: 1,
            num_resets: 0,
            num_mpi_calls: 2,
            num_omp_parallels: 0,
            num_omp_tasks: 0,
            num_gpu_runtime_calls: 0,
            elapsed_time: 1000,
            useful_time: 600,
            mpi_time: 400,
            omp_load_imbalance_time: 0,
            omp_scheduling_time: 0,
            omp_serialization_time: 0,
            gpu_runtime_time: 0,
            gpu_useful_time: 0,
            gpu_communication_time: 0,
            gpu_inactive_time: 0,
            max_gpu_useful_time: 0,
            max_gpu_active_time: 0,
        }
    }

    #[test]
    fn mpi_normd_proc_divides_by_cpu_count() {
        let base = BaseMetrics::from_snapshot(&snapshot(), 4.0, 0);
        assert_eq!(base.mpi_normd_proc(), 100);
    }

    #[test]
    fn mpi_normd_proc_falls_back_when_cpu_count_is_zero() {
        let base = BaseMetrics::from_snapshot(&snapshot(), 0.0, 0);
        assert_eq!(base.mpi_normd_proc(), 400);
    }
}
