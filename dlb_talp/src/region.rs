//! Monitoring regions: named, process-local measurement scopes mutated by
//! region flushes.

use crate::sample::Macrosample;
use crate::shmem_registry::SlotId;
use dlb_common::clock::NO_TIMESTAMP;

/// Index-based handle into a process's region arena
/// ([`crate::store::RegionStore`]). Stable for the life of the process;
/// avoids back-pointers between regions and the open-region stack
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegionId(pub(crate) usize);

/// A named measurement scope: computation, MPI, OpenMP and GPU time
/// accumulated across any number of start/stop pairs.
#[derive(Debug, Clone)]
pub struct MonitoringRegion {
    name: String,
    avg_cpus: f64,

    started: bool,
    internal: bool,
    enabled: bool,

    start_time: i64,
    stop_time: i64,

    num_measurements: u64,
    num_resets: u64,
    num_mpi_calls: u64,
    num_omp_parallels: u64,
    num_omp_tasks: u64,
    num_gpu_runtime_calls: u64,

    elapsed_time: i64,
    useful_time: i64,
    mpi_time: i64,
    omp_load_imbalance_time: i64,
    omp_scheduling_time: i64,
    omp_serialization_time: i64,
    gpu_runtime_time: i64,

    gpu_useful_time: i64,
    gpu_communication_time: i64,
    gpu_inactive_time: i64,
    max_gpu_useful_time: i64,
    max_gpu_active_time: i64,

    /// Shared-registry slot mirroring this region's `(mpi, useful)` times
    /// when `talp-external-profiler` is enabled. `None` otherwise, or for
    /// regions created before the shared registry was attached.
    shared_slot: Option<SlotId>,
}

impl MonitoringRegion {
    pub(crate) fn new(name: String, enabled: bool, internal: bool) -> Self {
        Self {
            name,
            avg_cpus: 0.0,
            started: false,
            internal,
            enabled,
            start_time: NO_TIMESTAMP,
            stop_time: NO_TIMESTAMP,
            num_measurements: 0,
            num_resets: 0,
            num_mpi_calls: 0,
            num_omp_parallels: 0,
            num_omp_tasks: 0,
            num_gpu_runtime_calls: 0,
            elapsed_time: 0,
            useful_time: 0,
            mpi_time: 0,
            omp_load_imbalance_time: 0,
            omp_scheduling_time: 0,
            omp_serialization_time: 0,
            gpu_runtime_time: 0,
            gpu_useful_time: 0,
            gpu_communication_time: 0,
            gpu_inactive_time: 0,
            max_gpu_useful_time: 0,
            max_gpu_active_time: 0,
            shared_slot: None,
        }
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` while between a successful start and its matching stop.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// `true` if region-select filtering left this region enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Timestamp this region was last started at, ns. Meaningful only
    /// while [`Self::is_started`] is true.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// `true` for library-internal regions (currently unused by any
    /// built-in region, reserved for future instrumentation scopes that
    /// should not appear in user-facing summaries).
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// Total accumulated elapsed time across every start/stop pair, ns.
    pub fn elapsed_time(&self) -> i64 {
        self.elapsed_time
    }

    /// Total accumulated useful compute time, ns.
    pub fn useful_time(&self) -> i64 {
        self.useful_time
    }

    /// Total accumulated MPI time, ns.
    pub fn mpi_time(&self) -> i64 {
        self.mpi_time
    }

    /// Total accumulated OpenMP load-imbalance time, ns.
    pub fn omp_load_imbalance_time(&self) -> i64 {
        self.omp_load_imbalance_time
    }

    /// Total accumulated OpenMP scheduling time, ns.
    pub fn omp_scheduling_time(&self) -> i64 {
        self.omp_scheduling_time
    }

    /// Total accumulated OpenMP serialization time, ns.
    pub fn omp_serialization_time(&self) -> i64 {
        self.omp_serialization_time
    }

    /// Total accumulated GPU runtime-call time, ns.
    pub fn gpu_runtime_time(&self) -> i64 {
        self.gpu_runtime_time
    }

    /// Total accumulated GPU useful (kernel) time, ns.
    pub fn gpu_useful_time(&self) -> i64 {
        self.gpu_useful_time
    }

    /// Total accumulated GPU communication (memory-copy) time, ns.
    pub fn gpu_communication_time(&self) -> i64 {
        self.gpu_communication_time
    }

    /// Total accumulated GPU inactive (idle device) time, ns.
    pub fn gpu_inactive_time(&self) -> i64 {
        self.gpu_inactive_time
    }

    /// Running maximum of a single flush's GPU useful time, ns. Feeds the
    /// POP `gpu_load_balance` ratio.
    pub fn max_gpu_useful_time(&self) -> i64 {
        self.max_gpu_useful_time
    }

    /// Running maximum of a single flush's GPU useful-plus-communication
    /// time, ns. Feeds the POP `gpu_communication_efficiency` ratio.
    pub fn max_gpu_active_time(&self) -> i64 {
        self.max_gpu_active_time
    }

    /// Parallel regions completed while this region was open.
    pub fn num_omp_parallels(&self) -> u64 {
        self.num_omp_parallels
    }

    /// OpenMP task events recorded while this region was open.
    pub fn num_omp_tasks(&self) -> u64 {
        self.num_omp_tasks
    }

    /// GPU runtime calls made while this region was open.
    pub fn num_gpu_runtime_calls(&self) -> u64 {
        self.num_gpu_runtime_calls
    }

    /// Number of completed start/stop pairs since the last reset.
    pub fn num_measurements(&self) -> u64 {
        self.num_measurements
    }

    /// Number of times this region has been reset.
    pub fn num_resets(&self) -> u64 {
        self.num_resets
    }

    /// Number of MPI calls attributed to this region.
    pub fn num_mpi_calls(&self) -> u64 {
        self.num_mpi_calls
    }

    /// Shared-registry slot mirroring this region, if attached.
    pub fn shared_slot(&self) -> Option<SlotId> {
        self.shared_slot
    }

    pub(crate) fn set_shared_slot(&mut self, slot: SlotId) {
        self.shared_slot = Some(slot);
    }

    /// Mark the region started at `now`. Caller (the region store) is
    /// responsible for the `Noupdt`-on-already-started check; this method
    /// only records the timestamp.
    pub(crate) fn mark_started(&mut self, now: i64) {
        self.started = true;
        self.start_time = now;
    }

    /// Fold a macrosample into this region's accumulated timers, then mark
    /// it stopped and bump its measurement count. Used by
    /// [`crate::flush`]'s stop path.
    pub(crate) fn stop_with(&mut self, macro_sample: &Macrosample, now: i64) {
        self.accumulate(macro_sample);
        self.stop_time = now;
        self.elapsed_time += self.stop_time - self.start_time;
        self.num_measurements += 1;
        self.started = false;
    }

    /// Fold a macrosample into this region's timers without stopping it.
    /// Every currently open region receives this on every flush.
    pub(crate) fn accumulate(&mut self, macro_sample: &Macrosample) {
        self.useful_time += macro_sample.useful_time;
        self.mpi_time += macro_sample.mpi_time;
        self.omp_load_imbalance_time += macro_sample.omp_load_imbalance_time;
        self.omp_scheduling_time += macro_sample.omp_scheduling_time;
        self.omp_serialization_time += macro_sample.omp_serialization_time;
        self.gpu_runtime_time += macro_sample.gpu_runtime_time;
        self.num_mpi_calls += macro_sample.num_mpi_calls as u64;
        self.num_omp_parallels += macro_sample.num_omp_parallels as u64;
        self.num_omp_tasks += macro_sample.num_omp_tasks as u64;
        self.num_gpu_runtime_calls += macro_sample.num_gpu_runtime_calls as u64;
    }

    /// Fold a GPU sample into this region's GPU timers, updating the
    /// running maxima used by the POP GPU efficiency ratios.
    pub(crate) fn accumulate_gpu(&mut self, gpu: &dlb_gpu::GpuMeasurements) {
        self.gpu_useful_time += gpu.useful_ns;
        self.gpu_communication_time += gpu.communication_ns;
        self.gpu_inactive_time += gpu.inactive_ns;
        self.max_gpu_useful_time = self.max_gpu_useful_time.max(gpu.useful_ns);
        self.max_gpu_active_time = self
            .max_gpu_active_time
            .max(gpu.useful_ns + gpu.communication_ns);
    }

    /// Zero every accumulated timer and counter, implicitly stopping the
    /// region first if it was started.
    pub(crate) fn reset(&mut self) {
        self.started = false;
        self.start_time = NO_TIMESTAMP;
        self.stop_time = NO_TIMESTAMP;
        self.elapsed_time = 0;
        self.useful_time = 0;
        self.mpi_time = 0;
        self.omp_load_imbalance_time = 0;
        self.omp_scheduling_time = 0;
        self.omp_serialization_time = 0;
        self.gpu_runtime_time = 0;
        self.gpu_useful_time = 0;
        self.gpu_communication_time = 0;
        self.gpu_inactive_time = 0;
        self.max_gpu_useful_time = 0;
        self.max_gpu_active_time = 0;
        self.num_measurements = 0;
        self.num_mpi_calls = 0;
        self.num_omp_parallels = 0;
        self.num_omp_tasks = 0;
        self.num_gpu_runtime_calls = 0;
        self.num_resets += 1;
    }

    pub(crate) fn set_avg_cpus(&mut self, avg_cpus: f64) {
        self.avg_cpus = avg_cpus;
    }

    /// Average CPU count observed while this region was open.
    pub fn avg_cpus(&self) -> f64 {
        self.avg_cpus
    }
}
