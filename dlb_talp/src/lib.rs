//! # dlb_talp
//!
//! The Time-And-Load Profiler: per-thread sample aggregation into named
//! monitoring regions, OpenMP parallel-region attribution, and the shared
//! region registry that lets sibling processes read a producer's region
//! times without coordinating with it.
//!
//! [`TalpProcess`] is the single entry point a host application (or its
//! MPI/OpenMP/GPU interception layer) drives: the event-source methods
//! mutate the calling thread's [`sample::ThreadSample`]; the control-API
//! methods start/stop/reset regions and read back snapshots. Every
//! mutating method first checks the calling thread's observer flag and
//! returns [`error::TalpError::Permission`] if it is set.
#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod filter;
pub mod flush;
pub mod openmp;
pub mod region;
pub mod sample;
pub mod shmem_registry;
pub mod store;

pub use error::{TalpError, TalpResult};
pub use filter::RegionFilter;
pub use region::{MonitoringRegion, RegionId};
pub use sample::{Macrosample, SampleEvent, ThreadSample};
pub use shmem_registry::{SlotId, TalpRegistry};
pub use store::{RegionStore, GLOBAL_REGION_NAME};

use dlb_common::clock::now_ns;
use openmp::{ParallelAttribution, ParallelAttributionResult, TeamArray};
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

thread_local! {
    /// One [`ThreadSample`] per `(TalpProcess, thread)` pair, keyed by the
    /// owning process's address so that more than one `TalpProcess` (e.g.
    /// in tests) can coexist without threads colliding on a single slot.
    static CURRENT_SAMPLE: RefCell<HashMap<usize, Arc<ThreadSample>>> = RefCell::new(HashMap::new());
    /// `true` once this thread has called [`TalpProcess::mark_observer`].
    /// Observer threads may read but never mutate measurement state.
    static IS_OBSERVER: Cell<bool> = const { Cell::new(false) };
}

/// A read-only snapshot of a [`MonitoringRegion`], decoupled from the
/// region store's lock so it can be handed to [`dlb_metrics`] or an output
/// writer after the mutex is released.
#[derive(Debug, Clone)]
pub struct RegionSnapshot {
    /// Region name.
    pub name: String,
    /// Average CPU count observed while the region was open.
    pub avg_cpus: f64,
    /// Completed start/stop pairs since the last reset.
    pub num_measurements: u64,
    /// Resets since creation.
    pub num_resets: u64,
    /// MPI calls attributed to the region.
    pub num_mpi_calls: u64,
    /// Parallel regions completed while the region was open.
    pub num_omp_parallels: u64,
    /// OpenMP task events recorded while the region was open.
    pub num_omp_tasks: u64,
    /// GPU runtime calls made while the region was open.
    pub num_gpu_runtime_calls: u64,
    /// Total accumulated elapsed time, ns.
    pub elapsed_time: i64,
    /// Total accumulated useful compute time, ns.
    pub useful_time: i64,
    /// Total accumulated MPI time, ns.
    pub mpi_time: i64,
    /// Total accumulated OpenMP load-imbalance time, ns.
    pub omp_load_imbalance_time: i64,
    /// Total accumulated OpenMP scheduling time, ns.
    pub omp_scheduling_time: i64,
    /// Total accumulated OpenMP serialization time, ns.
    pub omp_serialization_time: i64,
    /// Total accumulated GPU runtime-call time, ns.
    pub gpu_runtime_time: i64,
    /// Total accumulated GPU useful (kernel) time, ns.
    pub gpu_useful_time: i64,
    /// Total accumulated GPU communication (memory-copy) time, ns.
    pub gpu_communication_time: i64,
    /// Total accumulated GPU inactive time, ns.
    pub gpu_inactive_time: i64,
    /// Running maximum of a single flush's GPU useful time, ns.
    pub max_gpu_useful_time: i64,
    /// Running maximum of a single flush's GPU useful-plus-communication
    /// time, ns.
    pub max_gpu_active_time: i64,
}

impl From<&MonitoringRegion> for RegionSnapshot {
    fn from(region: &MonitoringRegion) -> Self {
        RegionSnapshot {
            name: region.name().to_string(),
            avg_cpus: region.avg_cpus(),
            num_measurements: region.num_measurements(),
            num_resets: region.num_resets(),
            num_mpi_calls: region.num_mpi_calls(),
            num_omp_parallels: region.num_omp_parallels(),
            num_omp_tasks: region.num_omp_tasks(),
            num_gpu_runtime_calls: region.num_gpu_runtime_calls(),
            elapsed_time: region.elapsed_time(),
            useful_time: region.useful_time(),
            mpi_time: region.mpi_time(),
            omp_load_imbalance_time: region.omp_load_imbalance_time(),
            omp_scheduling_time: region.omp_scheduling_time(),
            omp_serialization_time: region.omp_serialization_time(),
            gpu_runtime_time: region.gpu_runtime_time(),
            gpu_useful_time: region.gpu_useful_time(),
            gpu_communication_time: region.gpu_communication_time(),
            gpu_inactive_time: region.gpu_inactive_time(),
            max_gpu_useful_time: region.max_gpu_useful_time(),
            max_gpu_active_time: region.max_gpu_active_time(),
        }
    }
}

/// The process-wide TALP state: region store, per-thread samples, OpenMP
/// parallel attribution, GPU collector and (optionally) the shared region
/// registry. One instance per instrumented process.
pub struct TalpProcess {
    pid: u32,
    external_profiler: bool,
    regions: Mutex<RegionStore>,
    samples: Mutex<Vec<Arc<ThreadSample>>>,
    attribution: ParallelAttribution,
    gpu: dlb_gpu::GpuSampleCollector,
    registry: Mutex<Option<(TalpRegistry, HashMap<RegionId, SlotId>)>>,
    registry_key: String,
    size_multiplier: u32,
}

impl TalpProcess {
    /// A fresh process with only the global region registered. `filter`
    /// comes from `talp-region-select`; `external_profiler` mirrors
    /// `talp-external-profiler`; `registry_key`/`size_multiplier` feed
    /// [`TalpRegistry::init`] when [`Self::attach`] is called.
    pub fn new(filter: RegionFilter, external_profiler: bool, registry_key: &str, size_multiplier: u32) -> Self {
        let mut store = RegionStore::new(filter);
        let global = store.global();
        flush::start_region(&mut store, global, now_ns()).expect("global region always starts");
        TalpProcess {
            pid: std::process::id(),
            external_profiler,
            regions: Mutex::new(store),
            samples: Mutex::new(Vec::new()),
            attribution: ParallelAttribution::new(),
            gpu: dlb_gpu::GpuSampleCollector::new(),
            registry: Mutex::new(None),
            registry_key: registry_key.to_string(),
            size_multiplier: size_multiplier.max(1),
        }
    }

    /// Mark the calling thread as an observer: it may read metrics but
    /// every mutating call it makes from here on returns
    /// [`TalpError::Permission`].
    pub fn mark_observer(&self) {
        IS_OBSERVER.with(|flag| flag.set(true));
    }

    fn check_not_observer() -> TalpResult<()> {
        if IS_OBSERVER.with(|flag| flag.get()) {
            return Err(TalpError::Permission);
        }
        Ok(())
    }

    /// This thread's sample, lazily allocated. A thread created while
    /// regions are open inherits the innermost open region's start time
    /// as its initial `last_updated_timestamp` rather than "now"; if more
    /// than one region is open, the span between the outermost and the
    /// innermost start times is scheduled as a one-shot correction folded
    /// into `omp_serialization_time` on the next flush.
    fn sample(&self) -> Arc<ThreadSample> {
        let key = self as *const _ as usize;
        CURRENT_SAMPLE.with(|cell| {
            if let Some(existing) = cell.borrow().get(&key) {
                return existing.clone();
            }
            let regions = self.regions.lock();
            let sample = match regions.last_open() {
                Some(innermost_id) => {
                    let innermost_start = regions.region(innermost_id).start_time();
                    let sample = Arc::new(ThreadSample::new_at(innermost_start));
                    let open = regions.open_regions();
                    if open.len() > 1 {
                        let outermost_start = regions.region(open[0]).start_time();
                        let span = innermost_start - outermost_start;
                        if span > 0 {
                            sample.schedule_nested_correction(span);
                        }
                    }
                    sample
                }
                None => Arc::new(ThreadSample::new()),
            };
            drop(regions);
            self.samples.lock().push(sample.clone());
            cell.borrow_mut().insert(key, sample.clone());
            sample
        })
    }

    /// Flush every sample with one shared timestamp and distribute the
    /// resulting macrosample into every currently-open region (the shared
    /// "flush" step every region start/stop begins with).
    fn flush_and_distribute(&self, now: i64) {
        let samples = self.samples.lock();
        let macro_sample = flush::flush_samples(&samples, now);
        drop(samples);
        let mut regions = self.regions.lock();
        flush::distribute(&mut regions, &macro_sample);
    }

    // ---- Control API -----------------------------------

    /// Register (or look up) a monitoring region by name.
    pub fn register(&self, name: &str) -> TalpResult<RegionId> {
        self.regions.lock().register(name).ok_or_else(|| TalpError::NoSuchRegion(name.to_string()))
    }

    /// The distinguished global region.
    pub fn get_global(&self) -> RegionId {
        self.regions.lock().global()
    }

    /// The innermost currently-open region, if any.
    pub fn get_last_open(&self) -> Option<RegionId> {
        self.regions.lock().last_open()
    }

    /// Start `handle`. A thread whose sample is still `disabled` is moved
    /// to `useful` as part of the flush this performs.
    pub fn start(&self, handle: RegionId) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.ensure_useful();
        let now = now_ns();
        self.flush_and_distribute(now);
        let mut regions = self.regions.lock();
        flush::start_region(&mut regions, handle, now)?;
        if self.external_profiler {
            drop(regions);
            self.mirror_to_registry(handle)?;
        }
        Ok(())
    }

    /// Stop `handle`.
    pub fn stop(&self, handle: RegionId) -> TalpResult<()> {
        Self::check_not_observer()?;
        let now = now_ns();
        let samples = self.samples.lock();
        let macro_sample = flush::flush_samples(&samples, now);
        drop(samples);
        let mut regions = self.regions.lock();
        flush::distribute(&mut regions, &macro_sample);
        flush::stop_region(&mut regions, handle, &Macrosample::default(), now)?;
        drop(regions);
        if self.external_profiler {
            self.mirror_to_registry(handle)?;
        }
        Ok(())
    }

    /// Reset `handle`, implicitly stopping it first if it was started.
    pub fn reset(&self, handle: RegionId) -> TalpResult<()> {
        Self::check_not_observer()?;
        flush::reset_region(&mut self.regions.lock(), handle)
    }

    /// A point-in-time snapshot of `handle`'s accumulated timers and
    /// counters, safe to hand to a reducer or output writer.
    pub fn report(&self, handle: RegionId) -> RegionSnapshot {
        RegionSnapshot::from(self.regions.lock().region(handle))
    }

    fn ensure_useful(&self) {
        let sample = self.sample();
        if sample.state() == sample::SampleState::Disabled {
            sample.handle_event(SampleEvent::EnterInstrumented, now_ns());
        }
    }

    fn mirror_to_registry(&self, handle: RegionId) -> TalpResult<()> {
        let mut guard = self.registry.lock();
        let Some((registry, slots)) = guard.as_mut() else {
            return Ok(());
        };
        let region_name = {
            let regions = self.regions.lock();
            regions.region(handle).name().to_string()
        };
        let slot_id = match slots.get(&handle) {
            Some(id) => *id,
            None => {
                let avg_cpus = { self.regions.lock().region(handle).avg_cpus() as u32 };
                let id = registry.register(self.pid, avg_cpus, &region_name)?;
                slots.insert(handle, id);
                self.regions.lock().region_mut(handle).set_shared_slot(id);
                id
            }
        };
        let (mpi, useful) = {
            let regions = self.regions.lock();
            let region = regions.region(handle);
            (region.mpi_time(), region.useful_time())
        };
        registry.set_times(slot_id, mpi, useful)?;
        Ok(())
    }

    // ---- MPI event sources ---------------------------------------------

    /// `MPI_Init` entry point. The global region is already open from
    /// [`Self::new`]; this just counts the call itself like any other MPI
    /// entry point.
    pub fn mpi_init(&self) -> TalpResult<()> {
        self.into_sync_call(false)?;
        self.out_of_sync_call(false)?;
        Ok(())
    }

    /// `MPI_Finalize` entry point. Counts the call, then stops the global
    /// region and, if `talp-external-profiler` is set, mirrors its final
    /// times into the shared registry.
    pub fn mpi_finalize(&self) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.into_sync_call(false)?;
        self.out_of_sync_call(false)?;
        let global = self.get_global();
        if self.regions.lock().region(global).is_started() {
            self.stop(global)?;
        }
        Ok(())
    }

    /// Entered a (possibly blocking-collective) MPI call.
    pub fn into_sync_call(&self, is_blocking_collective: bool) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.ensure_useful();
        if is_blocking_collective && self.external_profiler {
            self.flush_and_distribute(now_ns());
        }
        self.sample().handle_event(SampleEvent::IntoMpi, now_ns());
        Ok(())
    }

    /// Left an MPI call.
    pub fn out_of_sync_call(&self, is_blocking_collective: bool) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.sample().handle_event(SampleEvent::OutOfMpi, now_ns());
        if is_blocking_collective && self.external_profiler {
            self.flush_and_distribute(now_ns());
        }
        Ok(())
    }

    // ---- OpenMP event sources -------------------------------------------

    /// A worker (or the master) thread begins participating in
    /// instrumentation. Just forces lazy sample allocation, per the
    /// nested-creation edge case in [`Self::sample`].
    pub fn thread_begin(&self) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.sample();
        Ok(())
    }

    /// The thread will not be instrumented further; its sample is left in
    /// place (other threads may still read it) but this process no longer
    /// updates it.
    pub fn thread_end(&self) -> TalpResult<()> {
        Self::check_not_observer()?;
        let key = self as *const _ as usize;
        CURRENT_SAMPLE.with(|cell| {
            cell.borrow_mut().remove(&key);
        });
        Ok(())
    }

    /// A parallel region begins; allocates (or, at level 1, resizes) the
    /// team array.
    pub fn parallel_begin(&self, level: u32, requested_parallelism: u32) -> TalpResult<TeamArray> {
        Self::check_not_observer()?;
        Ok(self.attribution.parallel_begin(level, requested_parallelism))
    }

    /// A worker thread entered the parallel function at `index`: registers
    /// its sample into the team array and leaves the "spinning outside a
    /// parallel region" state.
    pub fn into_parallel_function(&self, team: &TeamArray, index: usize) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.ensure_useful();
        let sample = self.sample();
        self.attribution.register_member(team, index, sample.clone());
        sample.handle_event(SampleEvent::OutOfOmpOut, now_ns());
        Ok(())
    }

    /// A worker thread finished the parallel function and is now spinning
    /// outside a parallel region, waiting for the next one.
    pub fn outof_parallel_function(&self) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.ensure_useful();
        self.sample().handle_event(SampleEvent::IntoOmpOut, now_ns());
        Ok(())
    }

    /// The parallel region ends: compute the scheduling/load-imbalance
    /// split across the team and fold it into every open region.
    pub fn parallel_end(&self, team: &TeamArray) -> TalpResult<ParallelAttributionResult> {
        Self::check_not_observer()?;
        let result = self.attribution.parallel_end(team);
        let mut regions = self.regions.lock();
        flush::distribute_parallel_attribution(&mut regions, result);
        drop(regions);
        self.sample().record_omp_parallel();
        Ok(result)
    }

    /// Entered an OpenMP implicit or explicit barrier/sync construct.
    pub fn into_parallel_sync(&self) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.ensure_useful();
        self.sample().handle_event(SampleEvent::IntoOmpSync, now_ns());
        Ok(())
    }

    /// Entered an OpenMP implicit barrier at the end of a worksharing
    /// construct; classified the same as [`Self::into_parallel_sync`].
    pub fn into_parallel_implicit_barrier(&self) -> TalpResult<()> {
        self.into_parallel_sync()
    }

    /// Left an OpenMP sync construct (implicit or explicit).
    pub fn outof_parallel_sync(&self) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.sample().handle_event(SampleEvent::OutOfOmpSync, now_ns());
        Ok(())
    }

    /// An OpenMP task was created, completed, or switched to. A task
    /// switch does not change TALP state, only the counter.
    pub fn task_event(&self) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.sample().record_omp_task();
        Ok(())
    }

    // ---- GPU event sources ----------------------------------------------

    /// Entered a GPU runtime API call.
    pub fn gpu_into_runtime_api(&self) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.ensure_useful();
        self.sample().handle_event(SampleEvent::IntoGpu, now_ns());
        Ok(())
    }

    /// Left a GPU runtime API call.
    pub fn gpu_out_of_runtime_api(&self) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.sample().handle_event(SampleEvent::OutOfGpu, now_ns());
        Ok(())
    }

    /// The installed GPU plugin reported merged activity; fold it
    /// directly into the running GPU total.
    pub fn gpu_update_sample(&self, useful_ns: i64, communication_ns: i64, inactive_ns: i64) -> TalpResult<()> {
        Self::check_not_observer()?;
        self.gpu.add_measurements(useful_ns, communication_ns, inactive_ns);
        Ok(())
    }

    /// Access to the GPU collector, for a collaborator that wants to push
    /// raw activity records rather than pre-merged totals.
    pub fn gpu_collector(&self) -> &dlb_gpu::GpuSampleCollector {
        &self.gpu
    }

    /// Sync the GPU collector's running total into every currently-open
    /// region's GPU timers. Called at region stop, or any time the host
    /// wants GPU numbers folded in early.
    pub fn sync_gpu(&self) {
        let mut measurements = dlb_gpu::GpuMeasurements::default();
        self.gpu.sync_measurements(&mut measurements);
        if measurements == dlb_gpu::GpuMeasurements::default() {
            return;
        }
        let mut regions = self.regions.lock();
        let open: Vec<RegionId> = regions.open_regions().to_vec();
        for id in open {
            regions.region_mut(id).accumulate_gpu(&measurements);
        }
    }

    // ---- Out-of-band / observer API -------------------------------------

    /// Attach to the node's shared TALP region registry, creating it if
    /// this is the first process on the node to do so.
    pub fn attach(&self) -> TalpResult<()> {
        let mut guard = self.registry.lock();
        if guard.is_some() {
            return Ok(());
        }
        let registry = TalpRegistry::init(&self.registry_key, self.size_multiplier)?;
        *guard = Some((registry, HashMap::new()));
        Ok(())
    }

    /// Detach from the shared registry. The directory itself is cleaned up
    /// by `dlb_shmem`'s lifecycle once no process has it mapped.
    pub fn detach(&self) {
        *self.registry.lock() = None;
    }

    /// Number of CPUs visible to this process.
    pub fn get_num_cpus(&self) -> usize {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }

    /// Every pid with at least one region registered in the shared
    /// registry on this node. [`TalpError::NoTalp`] if not attached.
    pub fn get_pid_list(&self) -> TalpResult<Vec<u32>> {
        let guard = self.registry.lock();
        let (registry, _) = guard.as_ref().ok_or(TalpError::NoTalp)?;
        Ok(registry.pid_list())
    }

    /// Aggregate `(mpi_time, useful_time)` across every shared-registry
    /// slot owned by `pid`, summed over every region it has registered.
    pub fn get_times(&self, pid: u32) -> TalpResult<(i64, i64)> {
        let guard = self.registry.lock();
        let (registry, _) = guard.as_ref().ok_or(TalpError::NoTalp)?;
        let mut total_mpi = 0;
        let mut total_useful = 0;
        for slot in registry.slots_for_pid(pid) {
            let (_, mpi, useful) = registry.entry(slot)?;
            total_mpi += mpi;
            total_useful += useful;
        }
        Ok((total_mpi, total_useful))
    }

    /// Every `(pid, mpi_time, useful_time)` entry registered under `name`
    /// in the shared registry, sorted by pid.
    pub fn get_node_times(&self, name: &str) -> TalpResult<Vec<(u32, i64, i64)>> {
        let guard = self.registry.lock();
        let (registry, _) = guard.as_ref().ok_or(TalpError::NoTalp)?;
        registry.region_list(name).into_iter().map(|slot| registry.entry(slot)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn register_and_start_stop_global_region() {
        let process = TalpProcess::new(RegionFilter::AllowAll, false, "", 1);
        let region = process.register("R").unwrap();
        process.start(region).unwrap();
        thread::sleep(std::time::Duration::from_millis(1));
        process.stop(region).unwrap();
        let snapshot = process.report(region);
        assert_eq!(snapshot.num_measurements, 1);
        assert!(snapshot.useful_time >= 900_000);
        assert_eq!(snapshot.mpi_time, 0);
    }

    #[test]
    fn nested_regions_count_measurements_independently() {
        let process = TalpProcess::new(RegionFilter::AllowAll, false, "", 1);
        let outer = process.register("Outer").unwrap();
        process.start(outer).unwrap();
        for _ in 0..10 {
            let middle = process.register("Middle").unwrap();
            process.start(middle).unwrap();
            for _ in 0..10 {
                let inner = process.register("Inner").unwrap();
                process.start(inner).unwrap();
                process.stop(inner).unwrap();
            }
            process.stop(middle).unwrap();
        }
        process.stop(outer).unwrap();

        assert_eq!(process.report(outer).num_measurements, 1);
        assert_eq!(process.report(process.register("Middle").unwrap()).num_measurements, 10);
        assert_eq!(process.report(process.register("Inner").unwrap()).num_measurements, 100);
    }

    #[test]
    fn mpi_round_trip_records_three_calls_and_some_time() {
        let process = TalpProcess::new(RegionFilter::AllowAll, false, "", 1);
        process.mpi_init().unwrap();
        process.into_sync_call(false).unwrap();
        thread::sleep(std::time::Duration::from_micros(100));
        process.out_of_sync_call(false).unwrap();
        process.mpi_finalize().unwrap();

        let global = process.get_global();
        let snapshot = process.report(global);
        assert!(snapshot.useful_time > 0);
        assert!(snapshot.mpi_time > 0);
        assert_eq!(snapshot.num_mpi_calls, 3);
    }

    #[test]
    fn observer_thread_cannot_mutate() {
        let process = TalpProcess::new(RegionFilter::AllowAll, false, "", 1);
        let region = process.register("R").unwrap();
        process.mark_observer();
        assert!(matches!(process.start(region), Err(TalpError::Permission)));
    }

    #[test]
    fn reset_on_started_region_implicitly_stops_and_counts_one_reset() {
        let process = TalpProcess::new(RegionFilter::AllowAll, false, "", 1);
        let region = process.register("R").unwrap();
        process.start(region).unwrap();
        process.reset(region).unwrap();
        process.start(region).unwrap();
        process.stop(region).unwrap();
        let snapshot = process.report(region);
        assert_eq!(snapshot.num_resets, 1);
        assert_eq!(snapshot.num_measurements, 1);
    }

    #[test]
    fn filtered_region_rejects_start_with_noupdt() {
        let process = TalpProcess::new(RegionFilter::parse("exclude:Private"), false, "", 1);
        let region = process.register("Private").unwrap();
        assert!(matches!(process.start(region), Err(TalpError::Noupdt)));
    }

    #[test]
    fn parallel_attribution_reaches_open_regions() {
        let process = Arc::new(TalpProcess::new(RegionFilter::AllowAll, false, "", 1));
        let region = process.register("Parallel").unwrap();
        process.start(region).unwrap();

        let team = process.parallel_begin(1, 2).unwrap();
        let p1 = Arc::clone(&process);
        let team1 = match &team {
            TeamArray::Level1 => TeamArray::Level1,
            TeamArray::Nested(arr) => TeamArray::Nested(Arc::clone(arr)),
        };
        let handle = thread::spawn(move || {
            p1.thread_begin().unwrap();
            p1.into_parallel_function(&team1, 1).unwrap();
            p1.into_parallel_sync().unwrap();
            thread::sleep(std::time::Duration::from_micros(200));
            p1.outof_parallel_sync().unwrap();
        });
        process.into_parallel_function(&team, 0).unwrap();
        process.into_parallel_sync().unwrap();
        process.outof_parallel_sync().unwrap();
        handle.join().unwrap();

        process.parallel_end(&team).unwrap();
        process.stop(region).unwrap();
        let snapshot = process.report(region);
        assert!(snapshot.omp_scheduling_time > 0 || snapshot.omp_load_imbalance_time >= 0);
    }

    #[test]
    fn gpu_sample_folds_into_open_region() {
        let process = TalpProcess::new(RegionFilter::AllowAll, false, "", 1);
        let region = process.register("R").unwrap();
        process.start(region).unwrap();
        process.gpu_update_sample(100, 50, 0).unwrap();
        process.sync_gpu();
        process.stop(region).unwrap();
        let snapshot = process.report(region);
        assert_eq!(snapshot.gpu_useful_time, 100);
        assert_eq!(snapshot.gpu_communication_time, 50);
    }

    #[test]
    fn external_profiler_mirrors_region_times_into_shared_registry() {
        let key = format!("lib_test_{}", std::process::id());
        let process = TalpProcess::new(RegionFilter::AllowAll, true, &key, 1);
        process.attach().unwrap();
        let region = process.register("Mirrored").unwrap();
        process.start(region).unwrap();
        process.stop(region).unwrap();

        let times = process.get_node_times("Mirrored").unwrap();
        assert_eq!(times.len(), 1);
    }
}
