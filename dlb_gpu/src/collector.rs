//! Merges vendor-agnostic GPU activity intervals and flushes them into a
//! per-process GPU sample.

use crate::activity::{exclusive_duration, merge_intervals, ActivityRecord};
use crate::error::{GpuError, GpuResult};
use crate::plugin::{CpuAffinity, GpuMeasurements, GpuPlugin};
use std::sync::Mutex;

/// Collects kernel and memory-copy activity records from an external GPU
/// plugin, merges them, and folds the result into a running per-process
/// [`GpuMeasurements`] total consumed at region boundaries.
pub struct GpuSampleCollector {
    inner: Mutex<Inner>,
}

struct Inner {
    kernel_buffer: Vec<ActivityRecord>,
    memory_buffer: Vec<ActivityRecord>,
    safe_timestamp: i64,
    accumulated: GpuMeasurements,
    plugin: Option<Box<dyn GpuPlugin>>,
}

impl Default for GpuSampleCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuSampleCollector {
    /// A collector with no plugin installed and an empty watermark.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                kernel_buffer: Vec::new(),
                memory_buffer: Vec::new(),
                safe_timestamp: i64::MIN,
                accumulated: GpuMeasurements::default(),
                plugin: None,
            }),
        }
    }

    /// Register the vendor plugin this process will poll for GPU activity.
    /// Only one plugin may be installed per collector.
    pub fn install(&self, plugin: Box<dyn GpuPlugin>) -> GpuResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.plugin.is_some() {
            return Err(GpuError::AlreadyInstalled);
        }
        inner.plugin = Some(plugin);
        Ok(())
    }

    /// `true` if a plugin is installed.
    pub fn has_plugin(&self) -> bool {
        self.inner.lock().unwrap().plugin.is_some()
    }

    /// Preferred CPU affinity reported by the installed plugin, if any.
    pub fn affinity(&self) -> Option<CpuAffinity> {
        self.inner.lock().unwrap().plugin.as_ref()?.affinity()
    }

    /// Record a completed kernel launch.
    pub fn push_kernel(&self, record: ActivityRecord) {
        self.push(record);
    }

    /// Record a completed memory copy.
    pub fn push_memcpy(&self, record: ActivityRecord) {
        self.push(record);
    }

    fn push(&self, record: ActivityRecord) {
        let mut inner = self.inner.lock().unwrap();
        if record.end_ns < inner.safe_timestamp {
            tracing::trace!(
                end_ns = record.end_ns,
                safe_timestamp = inner.safe_timestamp,
                "dropping stale GPU activity record"
            );
            return;
        }
        match record.kind {
            crate::activity::ActivityKind::Kernel => inner.kernel_buffer.push(record),
            crate::activity::ActivityKind::MemoryCopy => inner.memory_buffer.push(record),
        }
    }

    /// Raise the watermark below which late-arriving records (from before a
    /// reset) are discarded.
    pub fn set_safe_timestamp(&self, timestamp: i64) {
        self.inner.lock().unwrap().safe_timestamp = timestamp;
    }

    /// Add directly into the running per-process GPU sample, bypassing
    /// interval merging. This is `talp_gpu_update_sample`'s own entry
    /// point: the merge algorithm in [`Self::update_sample`] ultimately
    /// computes the same three numbers and could call this, but a caller
    /// that already has merged totals (an external profiler, a test
    /// double) can report them directly.
    pub fn add_measurements(&self, useful_ns: i64, communication_ns: i64, inactive_ns: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.accumulated.useful_ns += useful_ns;
        inner.accumulated.communication_ns += communication_ns;
        inner.accumulated.inactive_ns += inactive_ns;
    }

    /// Merge buffered activity records into kernel-useful and
    /// memory-exclusive durations, fold them into the running total, and
    /// clear the buffers. Does not touch the installed plugin; call
    /// [`Self::sync_measurements`] for that.
    pub fn update_sample(&self) {
        let mut inner = self.inner.lock().unwrap();

        let kernel_raw: Vec<(i64, i64)> = inner
            .kernel_buffer
            .drain(..)
            .filter(ActivityRecord::is_valid)
            .map(|r| (r.start_ns, r.end_ns))
            .collect();
        let memory_raw: Vec<(i64, i64)> = inner
            .memory_buffer
            .drain(..)
            .filter(ActivityRecord::is_valid)
            .map(|r| (r.start_ns, r.end_ns))
            .collect();

        let kernel_merged = merge_intervals(kernel_raw);
        let memory_merged = merge_intervals(memory_raw);

        let kernel_useful: i64 = kernel_merged.iter().map(|(s, e)| e - s).sum();
        let memory_exclusive = exclusive_duration(&memory_merged, &kernel_merged);

        inner.accumulated.useful_ns += kernel_useful;
        inner.accumulated.communication_ns += memory_exclusive;
    }

    /// Poll the installed plugin (if any), fold its delta plus whatever
    /// [`Self::update_sample`] has accumulated into `out`, then reset this
    /// collector's running total. Mirrors `talp_gpu_sync_measurements`: the
    /// hook called from region-stop/flush before the macrosample absorbs
    /// GPU time.
    pub fn sync_measurements(&self, out: &mut GpuMeasurements) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(plugin) = inner.plugin.as_ref() {
            plugin.update_sample(&mut inner.accumulated);
        }
        let mut accumulated = std::mem::take(&mut inner.accumulated);
        out.drain_into(&mut accumulated);
    }

    /// Drop every buffered record and reset the watermark, without folding
    /// anything into the running total. Used when a region's measurement
    /// window is discarded outright (e.g. `reset`).
    pub fn discard(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.kernel_buffer.clear();
        inner.memory_buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityKind;

    #[test]
    fn spec_example_merges_into_expected_totals() {
        let collector = GpuSampleCollector::new();
        collector.push_kernel(ActivityRecord::new(100, 200, ActivityKind::Kernel));
        collector.push_memcpy(ActivityRecord::new(150, 250, ActivityKind::MemoryCopy));
        collector.update_sample();

        let mut out = GpuMeasurements::default();
        collector.sync_measurements(&mut out);
        assert_eq!(out.useful_ns, 100);
        assert_eq!(out.communication_ns, 50);
    }

    #[test]
    fn stale_records_below_the_watermark_are_dropped() {
        let collector = GpuSampleCollector::new();
        collector.set_safe_timestamp(1_000);
        collector.push_kernel(ActivityRecord::new(0, 500, ActivityKind::Kernel));
        collector.update_sample();

        let mut out = GpuMeasurements::default();
        collector.sync_measurements(&mut out);
        assert_eq!(out.useful_ns, 0);
    }

    #[test]
    fn invalid_intervals_are_dropped() {
        let collector = GpuSampleCollector::new();
        collector.push_kernel(ActivityRecord::new(500, 100, ActivityKind::Kernel));
        collector.update_sample();

        let mut out = GpuMeasurements::default();
        collector.sync_measurements(&mut out);
        assert_eq!(out.useful_ns, 0);
    }

    #[test]
    fn sync_measurements_resets_the_running_total() {
        let collector = GpuSampleCollector::new();
        collector.push_kernel(ActivityRecord::new(0, 100, ActivityKind::Kernel));
        collector.update_sample();

        let mut out = GpuMeasurements::default();
        collector.sync_measurements(&mut out);
        assert_eq!(out.useful_ns, 100);

        let mut out2 = GpuMeasurements::default();
        collector.sync_measurements(&mut out2);
        assert_eq!(out2.useful_ns, 0);
    }

    #[test]
    fn add_measurements_contributes_directly_to_sync() {
        let collector = GpuSampleCollector::new();
        collector.add_measurements(10, 20, 30);
        let mut out = GpuMeasurements::default();
        collector.sync_measurements(&mut out);
        assert_eq!(out, GpuMeasurements { useful_ns: 10, communication_ns: 20, inactive_ns: 30 });
    }

    struct DoublingPlugin;
    impl GpuPlugin for DoublingPlugin {
        fn update_sample(&self, out: &mut GpuMeasurements) {
            out.inactive_ns += 42;
        }
    }

    #[test]
    fn installed_plugin_contributes_to_sync() {
        let collector = GpuSampleCollector::new();
        collector.install(Box::new(DoublingPlugin)).unwrap();
        assert!(collector.has_plugin());

        let mut out = GpuMeasurements::default();
        collector.sync_measurements(&mut out);
        assert_eq!(out.inactive_ns, 42);
    }

    #[test]
    fn installing_a_second_plugin_fails() {
        let collector = GpuSampleCollector::new();
        collector.install(Box::new(DoublingPlugin)).unwrap();
        let second = collector.install(Box::new(DoublingPlugin));
        assert!(matches!(second, Err(GpuError::AlreadyInstalled)));
    }
}
