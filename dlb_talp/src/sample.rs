//! Per-thread sample: a cache-line-aligned accumulator whose current state
//! classifies all subsequent time until the next transition.
//!
//! The state field is driven by an explicit event enum, an explicit state
//! enum, and a single `handle_event` match, rather than scattered
//! `if`/`else` at call sites.

use dlb_common::atomic::{add_rlx, exchange_rlx, load_rlx};
use dlb_common::clock::{now_ns, resolve};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};

/// Which bucket of time a thread sample is currently accumulating into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SampleState {
    /// Outside any instrumented context.
    Disabled = 0,
    /// Executing useful compute.
    Useful = 1,
    /// Inside an MPI call.
    NotUsefulMpi = 2,
    /// Inside an OpenMP implicit/explicit barrier or sync construct.
    NotUsefulOmpIn = 3,
    /// Spinning outside a parallel region (e.g. idle worker thread).
    NotUsefulOmpOut = 4,
    /// Inside a GPU runtime call.
    NotUsefulGpu = 5,
}

impl SampleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SampleState::Disabled,
            1 => SampleState::Useful,
            2 => SampleState::NotUsefulMpi,
            3 => SampleState::NotUsefulOmpIn,
            4 => SampleState::NotUsefulOmpOut,
            5 => SampleState::NotUsefulGpu,
            other => unreachable!("invalid SampleState discriminant {other}"),
        }
    }
}

/// Event driving a [`ThreadSample`]'s state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEvent {
    /// The owning thread entered an instrumented region (region start, or
    /// first event on a disabled sample).
    EnterInstrumented,
    /// Entered a blocking MPI call.
    IntoMpi,
    /// Left a blocking MPI call.
    OutOfMpi,
    /// Entered an OpenMP implicit/explicit barrier or sync construct.
    IntoOmpSync,
    /// Left an OpenMP sync construct.
    OutOfOmpSync,
    /// Began spinning outside a parallel region.
    IntoOmpOut,
    /// Stopped spinning outside a parallel region.
    OutOfOmpOut,
    /// Entered a GPU runtime call.
    IntoGpu,
    /// Left a GPU runtime call.
    OutOfGpu,
}

/// Outcome of [`ThreadSample::handle_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded; new state.
    Ok(SampleState),
    /// The event made no sense from the current state and was ignored.
    Rejected(&'static str),
}

/// Cache-line-aligned per-thread time accumulator.
///
/// Only the owning thread calls [`Self::handle_event`] or [`Self::update`];
/// any thread may atomically load a timer or counter.
#[repr(C, align(64))]
pub struct ThreadSample {
    state: AtomicU8,
    last_updated_timestamp: AtomicI64,

    useful_time: AtomicI64,
    not_useful_mpi_time: AtomicI64,
    not_useful_omp_in_time: AtomicI64,
    not_useful_omp_out_time: AtomicI64,
    not_useful_gpu_time: AtomicI64,
    omp_serialization_time: AtomicI64,

    num_mpi_calls: AtomicU32,
    num_omp_parallels: AtomicU32,
    num_omp_tasks: AtomicU32,
    num_gpu_runtime_calls: AtomicU32,

    /// One-shot correction applied the first time this sample is flushed,
    /// for a thread whose sample was created mid-region. `None` once applied or never needed.
    pending_nested_correction: std::sync::Mutex<Option<i64>>,
}

impl ThreadSample {
    /// A freshly allocated sample in the `disabled` state, timestamped now.
    pub fn new() -> Self {
        Self::new_at(now_ns())
    }

    /// A freshly allocated sample whose initial timestamp is
    /// caller-supplied, used when a thread is created inside an already
    /// open region and must inherit that region's start time rather than
    /// "now".
    pub fn new_at(initial_timestamp: i64) -> Self {
        Self {
            state: AtomicU8::new(SampleState::Disabled as u8),
            last_updated_timestamp: AtomicI64::new(initial_timestamp),
            useful_time: AtomicI64::new(0),
            not_useful_mpi_time: AtomicI64::new(0),
            not_useful_omp_in_time: AtomicI64::new(0),
            not_useful_omp_out_time: AtomicI64::new(0),
            not_useful_gpu_time: AtomicI64::new(0),
            omp_serialization_time: AtomicI64::new(0),
            num_mpi_calls: AtomicU32::new(0),
            num_omp_parallels: AtomicU32::new(0),
            num_omp_tasks: AtomicU32::new(0),
            num_gpu_runtime_calls: AtomicU32::new(0),
            pending_nested_correction: std::sync::Mutex::new(None),
        }
    }

    /// Current state.
    pub fn state(&self) -> SampleState {
        SampleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn timer_for(&self, state: SampleState) -> Option<&AtomicI64> {
        match state {
            SampleState::Disabled => None,
            SampleState::Useful => Some(&self.useful_time),
            SampleState::NotUsefulMpi => Some(&self.not_useful_mpi_time),
            SampleState::NotUsefulOmpIn => Some(&self.not_useful_omp_in_time),
            SampleState::NotUsefulOmpOut => Some(&self.not_useful_omp_out_time),
            SampleState::NotUsefulGpu => Some(&self.not_useful_gpu_time),
        }
    }

    /// Add `now - last_updated_timestamp` to the timer for the *current*
    /// state, then reset the timestamp to `now`. Called on every
    /// transition and on an explicit flush.
    pub fn update(&self, now: i64) {
        let prev = self.last_updated_timestamp.swap(now, Ordering::AcqRel);
        let delta = now - prev;
        if delta == 0 {
            return;
        }
        if let Some(timer) = self.timer_for(self.state()) {
            add_rlx(timer, delta);
        }
    }

    /// Drive the state machine. `timestamp` resolves
    /// [`dlb_common::clock::NO_TIMESTAMP`] to "now"; passing a concrete
    /// value lets a region flush update every sample with one shared
    /// snapshot.
    pub fn handle_event(&self, event: SampleEvent, timestamp: i64) -> TransitionResult {
        let now = resolve(timestamp);
        self.update(now);

        use SampleEvent::*;
        use SampleState::*;

        let current = self.state();
        let next = match (current, event) {
            (Disabled, EnterInstrumented) => Useful,
            (Useful, IntoMpi) => {
                self.num_mpi_calls.fetch_add(1, Ordering::Relaxed);
                NotUsefulMpi
            }
            (NotUsefulMpi, OutOfMpi) => Useful,
            (Useful, IntoOmpSync) | (NotUsefulOmpOut, IntoOmpSync) => NotUsefulOmpIn,
            (NotUsefulOmpIn, OutOfOmpSync) => Useful,
            (Useful, IntoOmpOut) => NotUsefulOmpOut,
            (NotUsefulOmpOut, OutOfOmpOut) => Useful,
            (Useful, IntoGpu) => NotUsefulGpu,
            (NotUsefulGpu, OutOfGpu) => {
                self.num_gpu_runtime_calls.fetch_add(1, Ordering::Relaxed);
                Useful
            }
            _ => return TransitionResult::Rejected(rejected_reason(current, event)),
        };

        self.state.store(next as u8, Ordering::Release);
        TransitionResult::Ok(next)
    }

    /// Atomically read and reset every transferable timer, returning a
    /// [`Macrosample`]. Called under the samples mutex during a region
    /// flush.
    pub fn drain(&self) -> Macrosample {
        Macrosample {
            useful_time: exchange_rlx(&self.useful_time, 0),
            mpi_time: exchange_rlx(&self.not_useful_mpi_time, 0),
            omp_load_imbalance_time: 0,
            omp_scheduling_time: 0,
            omp_serialization_time: exchange_rlx(&self.omp_serialization_time, 0),
            not_useful_omp_out_time: exchange_rlx(&self.not_useful_omp_out_time, 0),
            gpu_runtime_time: exchange_rlx(&self.not_useful_gpu_time, 0),
            num_mpi_calls: self.num_mpi_calls.swap(0, Ordering::Relaxed),
            num_omp_parallels: self.num_omp_parallels.swap(0, Ordering::Relaxed),
            num_omp_tasks: self.num_omp_tasks.swap(0, Ordering::Relaxed),
            num_gpu_runtime_calls: self.num_gpu_runtime_calls.swap(0, Ordering::Relaxed),
        }
    }

    /// Raw, not-useful-OMP-in time, read without draining. Used by
    /// parallel-region-end attribution, which needs to read every team
    /// member's value before deciding the split.
    pub fn not_useful_omp_in_time(&self) -> i64 {
        load_rlx(&self.not_useful_omp_in_time)
    }

    /// Drain just the not-useful-OMP-in timer, used after parallel-region
    /// attribution has computed the scheduling/load-imbalance split.
    pub fn drain_not_useful_omp_in(&self) -> i64 {
        exchange_rlx(&self.not_useful_omp_in_time, 0)
    }

    /// Record one completed parallel region.
    pub fn record_omp_parallel(&self) {
        self.num_omp_parallels.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completed OpenMP task event (create/complete/switch).
    /// A task switch does not change TALP state, only the counter.
    pub fn record_omp_task(&self) {
        self.num_omp_tasks.fetch_add(1, Ordering::Relaxed);
    }

    /// Schedule the one-shot nested-region serialization correction applied
    /// on this sample's next flush.
    pub fn schedule_nested_correction(&self, span_ns: i64) {
        *self.pending_nested_correction.lock().unwrap() = Some(span_ns);
    }

    /// Apply and clear the pending nested-region correction, if any, adding
    /// it to `omp_serialization_time`.
    pub fn apply_pending_correction(&self) {
        let mut pending = self.pending_nested_correction.lock().unwrap();
        if let Some(span) = pending.take() {
            add_rlx(&self.omp_serialization_time, span);
        }
    }
}

impl Default for ThreadSample {
    fn default() -> Self {
        Self::new()
    }
}

fn rejected_reason(state: SampleState, event: SampleEvent) -> &'static str {
    match (state, event) {
        (SampleState::Disabled, _) => "sample is disabled; only EnterInstrumented is valid",
        (_, SampleEvent::EnterInstrumented) => "already inside an instrumented region",
        _ => "event not valid from the current sample state",
    }
}

/// Transient aggregation of a drained [`ThreadSample`]; not shared memory.
/// Folded into every open region by a region flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Macrosample {
    /// Useful compute time, ns.
    pub useful_time: i64,
    /// MPI time, ns.
    pub mpi_time: i64,
    /// OpenMP load-imbalance share, ns. Filled in by parallel-region-end
    /// attribution, not by a plain [`ThreadSample::drain`].
    pub omp_load_imbalance_time: i64,
    /// OpenMP scheduling share, ns. Filled in by parallel-region-end
    /// attribution.
    pub omp_scheduling_time: i64,
    /// Serialization time from the nested-region correction, ns.
    pub omp_serialization_time: i64,
    /// Time spent spinning outside a parallel region, ns.
    pub not_useful_omp_out_time: i64,
    /// GPU runtime call time, ns.
    pub gpu_runtime_time: i64,
    /// MPI calls since the last drain.
    pub num_mpi_calls: u32,
    /// Parallel regions completed since the last drain.
    pub num_omp_parallels: u32,
    /// OpenMP task events since the last drain.
    pub num_omp_tasks: u32,
    /// GPU runtime calls since the last drain.
    pub num_gpu_runtime_calls: u32,
}

impl Macrosample {
    /// Fold `other` additively into `self`. Used when more than one
    /// drained sample contributes to the same flush (multi-threaded
    /// process).
    pub fn merge(&mut self, other: &Macrosample) {
        self.useful_time += other.useful_time;
        self.mpi_time += other.mpi_time;
        self.omp_load_imbalance_time += other.omp_load_imbalance_time;
        self.omp_scheduling_time += other.omp_scheduling_time;
        self.omp_serialization_time += other.omp_serialization_time;
        self.not_useful_omp_out_time += other.not_useful_omp_out_time;
        self.gpu_runtime_time += other.gpu_runtime_time;
        self.num_mpi_calls += other.num_mpi_calls;
        self.num_omp_parallels += other.num_omp_parallels;
        self.num_omp_tasks += other.num_omp_tasks;
        self.num_gpu_runtime_calls += other.num_gpu_runtime_calls;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sample_starts_disabled() {
        let sample = ThreadSample::new();
        assert_eq!(sample.state(), SampleState::Disabled);
    }

    #[test]
    fn enter_instrumented_moves_to_useful() {
        let sample = ThreadSample::new();
        let result = sample.handle_event(SampleEvent::EnterInstrumented, now_ns());
        assert_eq!(result, TransitionResult::Ok(SampleState::Useful));
    }

    #[test]
    fn mpi_round_trip_returns_to_useful_and_counts_call() {
        let sample = ThreadSample::new();
        sample.handle_event(SampleEvent::EnterInstrumented, now_ns());
        sample.handle_event(SampleEvent::IntoMpi, now_ns());
        let result = sample.handle_event(SampleEvent::OutOfMpi, now_ns());
        assert_eq!(result, TransitionResult::Ok(SampleState::Useful));
        assert_eq!(sample.num_mpi_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn double_enter_is_rejected() {
        let sample = ThreadSample::new();
        sample.handle_event(SampleEvent::EnterInstrumented, now_ns());
        let result = sample.handle_event(SampleEvent::EnterInstrumented, now_ns());
        assert!(matches!(result, TransitionResult::Rejected(_)));
    }

    #[test]
    fn update_accumulates_time_in_current_state() {
        let sample = ThreadSample::new_at(1_000);
        sample.handle_event(SampleEvent::EnterInstrumented, 1_000);
        sample.update(1_500);
        assert_eq!(load_rlx(&sample.useful_time), 500);
    }

    #[test]
    fn drain_resets_timers_to_zero() {
        let sample = ThreadSample::new_at(0);
        sample.handle_event(SampleEvent::EnterInstrumented, 0);
        sample.update(1_000);
        let macro_sample = sample.drain();
        assert_eq!(macro_sample.useful_time, 1_000);
        assert_eq!(load_rlx(&sample.useful_time), 0);
    }

    #[test]
    fn gpu_round_trip_counts_runtime_call_on_exit() {
        let sample = ThreadSample::new();
        sample.handle_event(SampleEvent::EnterInstrumented, now_ns());
        sample.handle_event(SampleEvent::IntoGpu, now_ns());
        sample.handle_event(SampleEvent::OutOfGpu, now_ns());
        assert_eq!(sample.num_gpu_runtime_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn pending_correction_applies_once() {
        let sample = ThreadSample::new();
        sample.schedule_nested_correction(250);
        sample.apply_pending_correction();
        assert_eq!(load_rlx(&sample.omp_serialization_time), 250);
        sample.apply_pending_correction();
        assert_eq!(load_rlx(&sample.omp_serialization_time), 250);
    }

    #[test]
    fn macrosample_merge_is_additive() {
        let mut a = Macrosample {
            useful_time: 10,
            num_mpi_calls: 1,
            ..Default::default()
        };
        let b = Macrosample {
            useful_time: 5,
            num_mpi_calls: 2,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.useful_time, 15);
        assert_eq!(a.num_mpi_calls, 3);
    }
}
