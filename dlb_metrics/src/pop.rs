//! POP (Performance Optimization and Productivity) efficiency metrics,
//! computed from a reduced [`AppAggregate`].
//!
//! Two formula variants exist, selected by the `talp-model` configuration
//! option ([`dlb_common::config::TalpModel`]): `hybrid-v1` is fully
//! multiplicative (some ratios can exceed 1 under heavy imbalance);
//! `hybrid-v2` keeps `mpi_parallel_efficiency` independent of the OpenMP
//! terms. Both variants share the same denominators for the OpenMP and GPU
//! ratios.

use crate::reduce::AppAggregate;
use dlb_common::config::TalpModel;
use serde::{Deserialize, Serialize};

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// The full family of POP efficiency ratios for one monitoring region,
/// computed over an application-wide reduction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopMetrics {
    /// `useful / sum_active`.
    pub parallel_efficiency: f64,
    /// MPI parallel efficiency; formula depends on the model variant.
    pub mpi_parallel_efficiency: f64,
    /// `max_non_mpi_normd_proc / elapsed` (v2) or model-specific (v1).
    pub mpi_communication_efficiency: f64,
    /// Load-balance component of MPI efficiency.
    pub mpi_load_balance: f64,
    /// OpenMP parallel efficiency.
    pub omp_parallel_efficiency: f64,
    /// OpenMP load-balance efficiency.
    pub omp_load_balance: f64,
    /// OpenMP scheduling efficiency.
    pub omp_scheduling_efficiency: f64,
    /// OpenMP serialization efficiency.
    pub omp_serialization_efficiency: f64,
    /// Fraction of active time not offloaded to the GPU (v1) or its v2
    /// analogue.
    pub device_offload_efficiency: f64,
    /// GPU parallel efficiency, `0.0` when `num_gpus == 0`.
    pub gpu_parallel_efficiency: f64,
    /// GPU load-balance efficiency, `0.0` when `num_gpus == 0`.
    pub gpu_load_balance: f64,
    /// GPU communication efficiency, `0.0` when `num_gpus == 0`.
    pub gpu_communication_efficiency: f64,
    /// GPU orchestration efficiency, `0.0` when `num_gpus == 0`.
    pub gpu_orchestration_efficiency: f64,
}

/// Dispatch on `model` and compute the full POP metrics set.
pub fn compute(model: TalpModel, app: &AppAggregate) -> PopMetrics {
    match model {
        TalpModel::HybridV1 => compute_hybrid_v1(app),
        TalpModel::HybridV2 => compute_hybrid_v2(app),
    }
}

fn shared_terms(app: &AppAggregate) -> (f64, f64, f64, f64) {
    let elapsed = app.max_elapsed_time as f64;
    let sum_active = (app.sum_useful_time
        + app.sum_mpi_time
        + app.sum_omp_load_imbalance_time
        + app.sum_omp_scheduling_time
        + app.sum_omp_serialization_time
        + app.sum_gpu_runtime_time) as f64;
    let sum_active_non_omp = (app.sum_useful_time + app.sum_mpi_time + app.sum_gpu_runtime_time) as f64;
    let sum_active_non_gpu = sum_active - app.sum_gpu_runtime_time as f64;
    (elapsed, sum_active, sum_active_non_omp, sum_active_non_gpu)
}

fn omp_ratios(app: &AppAggregate, sum_active_non_omp: f64) -> (f64, f64, f64) {
    let serialization = app.sum_omp_serialization_time as f64;
    let imbalance = app.sum_omp_load_imbalance_time as f64;
    let scheduling = app.sum_omp_scheduling_time as f64;
    let load_balance = safe_div(
        sum_active_non_omp + serialization,
        sum_active_non_omp + serialization + imbalance,
    );
    let scheduling_efficiency = safe_div(
        sum_active_non_omp + serialization + imbalance,
        sum_active_non_omp + serialization + imbalance + scheduling,
    );
    let serialization_efficiency = safe_div(sum_active_non_omp, sum_active_non_omp + serialization);
    (load_balance, scheduling_efficiency, serialization_efficiency)
}

fn gpu_ratios(app: &AppAggregate, elapsed: f64) -> (f64, f64, f64, f64) {
    if app.num_gpus == 0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let sum_device_time = elapsed * app.num_gpus as f64;
    if sum_device_time == 0.0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let gpu_useful = app.sum_gpu_useful_time as f64;
    let max_gpu_useful = app.max_gpu_useful_time as f64;
    let max_gpu_active = app.max_gpu_active_time as f64;
    let parallel_efficiency = safe_div(gpu_useful, sum_device_time);
    let load_balance = safe_div(gpu_useful, max_gpu_useful * app.num_gpus as f64);
    let communication_efficiency = safe_div(max_gpu_useful, max_gpu_active);
    let orchestration_efficiency = safe_div(max_gpu_active, elapsed);
    (
        parallel_efficiency,
        load_balance,
        communication_efficiency,
        orchestration_efficiency,
    )
}

/// Ver. 1: every ratio multiplicative; `mpi_communication_efficiency` is
/// normalized against the sum of MPI and non-MPI application time rather
/// than `elapsed` directly, so it can exceed 1 under heavy imbalance.
pub fn compute_hybrid_v1(app: &AppAggregate) -> PopMetrics {
    let (elapsed, sum_active, sum_active_non_omp, sum_active_non_gpu) = shared_terms(app);
    let (omp_load_balance, omp_scheduling_efficiency, omp_serialization_efficiency) =
        omp_ratios(app, sum_active_non_omp);
    let (gpu_parallel_efficiency, gpu_load_balance, gpu_communication_efficiency, gpu_orchestration_efficiency) =
        gpu_ratios(app, elapsed);

    let useful = app.sum_useful_time as f64;
    let mpi = app.sum_mpi_time as f64;
    let mpi_normd_app = safe_div(app.sum_mpi_time as f64, app.num_cpus);
    let non_mpi_normd_app = app.max_elapsed_time as f64 - mpi_normd_app;
    let max_non_mpi_normd_proc =
        (app.max_elapsed_time - app.min_mpi_normd_proc) as f64;

    PopMetrics {
        parallel_efficiency: safe_div(useful, sum_active),
        mpi_parallel_efficiency: safe_div(useful, useful + mpi),
        mpi_communication_efficiency: safe_div(max_non_mpi_normd_proc, non_mpi_normd_app + mpi_normd_app),
        mpi_load_balance: safe_div(non_mpi_normd_app, max_non_mpi_normd_proc),
        omp_parallel_efficiency: safe_div(sum_active_non_omp, sum_active),
        omp_load_balance,
        omp_scheduling_efficiency,
        omp_serialization_efficiency,
        device_offload_efficiency: safe_div(sum_active_non_gpu, sum_active),
        gpu_parallel_efficiency,
        gpu_load_balance,
        gpu_communication_efficiency,
        gpu_orchestration_efficiency,
    }
}

/// Ver. 2: `mpi_parallel_efficiency` and `mpi_communication_efficiency`
/// are both normalized directly against `elapsed`, keeping MPI efficiency
/// independent of the OpenMP terms.
pub fn compute_hybrid_v2(app: &AppAggregate) -> PopMetrics {
    let (elapsed, sum_active, sum_active_non_omp, sum_active_non_gpu) = shared_terms(app);
    let (omp_load_balance, omp_scheduling_efficiency, omp_serialization_efficiency) =
        omp_ratios(app, sum_active_non_omp);
    let (gpu_parallel_efficiency, gpu_load_balance, gpu_communication_efficiency, gpu_orchestration_efficiency) =
        gpu_ratios(app, elapsed);

    let mpi_normd_app = safe_div(app.sum_mpi_time as f64, app.num_cpus);
    let non_mpi_normd_app = app.max_elapsed_time as f64 - mpi_normd_app;
    let max_non_mpi_normd_proc =
        (app.max_elapsed_time - app.min_mpi_normd_proc) as f64;
    let omp_not_useful = app.sum_omp_load_imbalance_time as f64
        + app.sum_omp_scheduling_time as f64
        + app.sum_omp_serialization_time as f64;

    PopMetrics {
        parallel_efficiency: safe_div(app.sum_useful_time as f64, sum_active),
        mpi_parallel_efficiency: safe_div(non_mpi_normd_app, elapsed),
        mpi_communication_efficiency: safe_div(max_non_mpi_normd_proc, elapsed),
        mpi_load_balance: safe_div(non_mpi_normd_app, max_non_mpi_normd_proc),
        omp_parallel_efficiency: safe_div(sum_active_non_omp, sum_active),
        omp_load_balance,
        omp_scheduling_efficiency,
        omp_serialization_efficiency,
        device_offload_efficiency: safe_div(
            app.sum_useful_time as f64 + omp_not_useful,
            app.sum_useful_time as f64 + omp_not_useful + app.sum_gpu_runtime_time as f64,
        ),
        gpu_parallel_efficiency,
        gpu_load_balance,
        gpu_communication_efficiency,
        gpu_orchestration_efficiency,
    }
}

/// Simpler MPI-only node model used by `query_pop_node_metrics`: no
/// OpenMP or GPU terms, evaluated directly on summed node useful/mpi time
/// rather than on a full [`AppAggregate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePopMetrics {
    /// `node_sum_useful / (node_sum_useful + node_sum_mpi)`.
    pub parallel_efficiency: f64,
    /// `max_useful_time / elapsed`.
    pub communication_efficiency: f64,
    /// `(node_sum_useful / processes_per_node) / max_useful_time`.
    pub load_balance: f64,
}

/// Compute the MPI-only node model from raw node-level sums.
pub fn compute_mpi_only_node_model(
    node_sum_useful: i64,
    node_sum_mpi: i64,
    processes_per_node: u32,
    max_useful_time: i64,
) -> NodePopMetrics {
    let elapsed = safe_div((node_sum_useful + node_sum_mpi) as f64, processes_per_node as f64);
    let max_useful = max_useful_time as f64;
    NodePopMetrics {
        parallel_efficiency: safe_div(node_sum_useful as f64, (node_sum_useful + node_sum_mpi) as f64),
        communication_efficiency: safe_div(max_useful, elapsed),
        load_balance: safe_div(node_sum_useful as f64 / processes_per_node.max(1) as f64, max_useful),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::{app_from_base, app_reduce, node_from_base, node_reduce, AppAggregate};
    use crate::base::BaseMetrics;

    fn app(useful: i64, mpi: i64, cpus: f64, elapsed: i64) -> AppAggregate {
        let base = BaseMetrics {
            num_cpus: cpus,
            num_gpus: 0,
            elapsed_time: elapsed,
            useful_time: useful,
            mpi_time: mpi,
            omp_load_imbalance_time: 0,
            omp_scheduling_time: 0,
            omp_serialization_time: 0,
            gpu_runtime_time: 0,
            gpu_useful_time: 0,
            gpu_communication_time: 0,
            max_gpu_useful_time: 0,
            max_gpu_active_time: 0,
        };
        let node = node_from_base(&base);
        app_from_base(&base, &node)
    }

    #[test]
    fn pure_compute_parallel_efficiency_is_one_when_no_mpi() {
        let metrics = compute_hybrid_v2(&app(1000, 0, 1.0, 1000));
        assert!((metrics.parallel_efficiency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hybrid_v1_and_v2_share_omp_denominators() {
        let a = app(800, 200, 1.0, 1000);
        let v1 = compute_hybrid_v1(&a);
        let v2 = compute_hybrid_v2(&a);
        assert_eq!(v1.omp_load_balance, v2.omp_load_balance);
        assert_eq!(v1.omp_scheduling_efficiency, v2.omp_scheduling_efficiency);
        assert_eq!(v1.omp_serialization_efficiency, v2.omp_serialization_efficiency);
    }

    #[test]
    fn gpu_ratios_are_zero_without_gpus() {
        let metrics = compute_hybrid_v2(&app(1000, 0, 1.0, 1000));
        assert_eq!(metrics.gpu_parallel_efficiency, 0.0);
    }

    #[test]
    fn mpi_only_node_model_matches_perfect_balance() {
        let model = compute_mpi_only_node_model(800, 200, 4, 200);
        assert!((model.parallel_efficiency - 0.8).abs() < 1e-9);
    }

    #[test]
    fn compute_dispatches_on_model() {
        let a = app(800, 200, 1.0, 1000);
        let v1 = compute(TalpModel::HybridV1, &a);
        let v2 = compute(TalpModel::HybridV2, &a);
        assert_eq!(v1.parallel_efficiency, v2.parallel_efficiency);
    }

    fn base(cpus: f64, mpi: i64, elapsed: i64, useful: i64) -> BaseMetrics {
        BaseMetrics {
            num_cpus: cpus,
            num_gpus: 0,
            elapsed_time: elapsed,
            useful_time: useful,
            mpi_time: mpi,
            omp_load_imbalance_time: 0,
            omp_scheduling_time: 0,
            omp_serialization_time: 0,
            gpu_runtime_time: 0,
            gpu_useful_time: 0,
            gpu_communication_time: 0,
            max_gpu_useful_time: 0,
            max_gpu_active_time: 0,
        }
    }

    // Two 4-cpu processes on the same node: mpi times 40 and 80 ns, both
    // running for an elapsed 1000 ns. Caught a regression where
    // `mpi_normd_app` was computed as `num_cpus * elapsed - mpi` (giving
    // 3960 here) instead of `mpi / num_cpus` (giving 15) — every hybrid-v1/v2
    // test above uses `cpus: 1.0`, where the two formulas coincide.
    #[test]
    fn hybrid_v2_mpi_ratios_scale_by_cpu_count() {
        let base1 = base(4.0, 40, 1000, 950);
        let base2 = base(4.0, 80, 1000, 900);
        let node = node_reduce(node_from_base(&base1), node_from_base(&base2));
        let a = app_reduce(app_from_base(&base1, &node), app_from_base(&base2, &node));

        let metrics = compute_hybrid_v2(&a);

        // mpi_normd_app = (40 + 80) / (4 + 4) = 15; non_mpi_normd_app = 1000 - 15 = 985
        assert!((metrics.mpi_parallel_efficiency - 0.985).abs() < 1e-9);
        // min_mpi_normd_proc = min(40/4, 80/4) = 10; max_non_mpi_normd_proc = 1000 - 10 = 990
        assert!((metrics.mpi_load_balance - 985.0 / 990.0).abs() < 1e-9);
    }
}
