//! Region start/stop/reset and the sample-flush algorithm that ties
//! [`crate::sample::ThreadSample`], [`crate::store::RegionStore`] and
//! [`crate::openmp`] together.
//!
//! Every function here takes already-locked state rather than locking
//! itself: the lock hierarchy (regions mutex outranks samples mutex, both
//! outrank nothing else) is established once by the caller
//! ([`crate::TalpProcess`]) and followed consistently, never by this
//! module reaching for a lock on its own.

use crate::error::{TalpError, TalpResult};
use crate::openmp::ParallelAttributionResult;
use crate::region::RegionId;
use crate::sample::{Macrosample, ThreadSample};
use crate::store::RegionStore;
use std::sync::Arc;

/// Call `update(now)` on every sample, then drain and merge them into one
/// [`Macrosample`]. A single shared `now` is used for every sample so the
/// sum-rule testable property holds.
pub fn flush_samples(samples: &[Arc<ThreadSample>], now: i64) -> Macrosample {
    let mut merged = Macrosample::default();
    for sample in samples {
        sample.update(now);
        sample.apply_pending_correction();
        merged.merge(&sample.drain());
    }
    merged
}

/// Fold `macro_sample` into every currently-open region. A region stopped
/// out of order still received every flush while it was open, inflating
/// outer regions with inner time — documented behaviour, not corrected
/// here.
pub fn distribute(store: &mut RegionStore, macro_sample: &Macrosample) {
    let open: Vec<RegionId> = store.open_regions().to_vec();
    for id in open {
        store.region_mut(id).accumulate(macro_sample);
    }
}

/// Fold a completed parallel-region-end attribution into every open
/// region's scheduling/load-imbalance timers.
pub fn distribute_parallel_attribution(store: &mut RegionStore, result: ParallelAttributionResult) {
    let open: Vec<RegionId> = store.open_regions().to_vec();
    for id in open {
        let region = store.region_mut(id);
        let mut macro_sample = Macrosample::default();
        macro_sample.omp_scheduling_time = result.sched_time;
        macro_sample.omp_load_imbalance_time = result.lb_time;
        region.accumulate(&macro_sample);
    }
}

/// Start `id`. Requires the caller to have already flushed every sample
/// with a shared `now` ([`flush_samples`]) and distributed the resulting
/// macrosample. `Noupdt` if the region is disabled by the region-select
/// filter or already started.
pub fn start_region(store: &mut RegionStore, id: RegionId, now: i64) -> TalpResult<()> {
    let region = store.region_mut(id);
    if !region.is_enabled() {
        return Err(TalpError::Noupdt);
    }
    if region.is_started() {
        return Err(TalpError::Noupdt);
    }
    region.mark_started(now);
    store.push_open(id);
    Ok(())
}

/// Stop `id`. Requires the caller to have already flushed every sample and
/// passed the resulting macrosample here to be folded in before the stop.
/// `Noupdt` if the region is disabled or not started.
pub fn stop_region(
    store: &mut RegionStore,
    id: RegionId,
    macro_sample: &Macrosample,
    now: i64,
) -> TalpResult<()> {
    {
        let region = store.region(id);
        if !region.is_enabled() || !region.is_started() {
            return Err(TalpError::Noupdt);
        }
    }
    store.region_mut(id).stop_with(macro_sample, now);
    store.remove_open(id);
    Ok(())
}

/// Reset `id`, implicitly stopping it first if it was started. `Noupdt` if the region is disabled by the filter.
pub fn reset_region(store: &mut RegionStore, id: RegionId) -> TalpResult<()> {
    if !store.region(id).is_enabled() {
        return Err(TalpError::Noupdt);
    }
    if store.region(id).is_started() {
        store.remove_open(id);
    }
    store.region_mut(id).reset();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RegionFilter;

    #[test]
    fn flush_samples_merges_every_sample() {
        let a = Arc::new(ThreadSample::new_at(0));
        a.handle_event(crate::sample::SampleEvent::EnterInstrumented, 0);
        let b = Arc::new(ThreadSample::new_at(0));
        b.handle_event(crate::sample::SampleEvent::EnterInstrumented, 0);

        let merged = flush_samples(&[a, b], 100);
        assert_eq!(merged.useful_time, 200);
    }

    #[test]
    fn start_then_stop_produces_one_measurement() {
        let mut store = RegionStore::new(RegionFilter::AllowAll);
        let id = store.register("R").unwrap();
        start_region(&mut store, id, 0).unwrap();
        assert!(store.region(id).is_started());

        let macro_sample = Macrosample {
            useful_time: 500,
            ..Default::default()
        };
        stop_region(&mut store, id, &macro_sample, 500).unwrap();
        assert_eq!(store.region(id).num_measurements(), 1);
        assert_eq!(store.region(id).elapsed_time(), 500);
    }

    #[test]
    fn starting_an_already_started_region_is_noupdt() {
        let mut store = RegionStore::new(RegionFilter::AllowAll);
        let id = store.register("R").unwrap();
        start_region(&mut store, id, 0).unwrap();
        assert!(matches!(start_region(&mut store, id, 10), Err(TalpError::Noupdt)));
    }

    #[test]
    fn stopping_a_not_started_region_is_noupdt() {
        let mut store = RegionStore::new(RegionFilter::AllowAll);
        let id = store.register("R").unwrap();
        let result = stop_region(&mut store, id, &Macrosample::default(), 0);
        assert!(matches!(result, Err(TalpError::Noupdt)));
    }

    #[test]
    fn filtered_out_region_rejects_start_and_stop() {
        let mut store = RegionStore::new(RegionFilter::parse("exclude:Private"));
        let id = store.register("Private").unwrap();
        assert!(matches!(start_region(&mut store, id, 0), Err(TalpError::Noupdt)));
    }

    #[test]
    fn reset_on_started_region_implicitly_stops_it() {
        let mut store = RegionStore::new(RegionFilter::AllowAll);
        let id = store.register("R").unwrap();
        start_region(&mut store, id, 0).unwrap();
        reset_region(&mut store, id).unwrap();
        assert!(!store.region(id).is_started());
        assert_eq!(store.region(id).num_resets(), 1);
        assert!(store.open_regions().is_empty());
    }

    #[test]
    fn distribute_folds_into_every_open_region() {
        let mut store = RegionStore::new(RegionFilter::AllowAll);
        let outer = store.register("Outer").unwrap();
        let inner = store.register("Inner").unwrap();
        start_region(&mut store, outer, 0).unwrap();
        start_region(&mut store, inner, 0).unwrap();

        distribute(
            &mut store,
            &Macrosample {
                useful_time: 10,
                ..Default::default()
            },
        );
        assert_eq!(store.region(outer).useful_time(), 10);
        assert_eq!(store.region(inner).useful_time(), 10);
    }
}
