//! Relaxed/acquire atomic helper functions.
//!
//! Mirrors the small set of atomic primitives the original library exposes
//! through its `support/atomic.h` macro family (`DLB_ATOMIC_ADD_RLX`,
//! `DLB_ATOMIC_EXCH_RLX`, …), expressed as plain functions over
//! `std::sync::atomic` rather than macros. `add_rlx`/`load_rlx`/`exchange_rlx`
//! are what every sample timer and counter in `dlb_talp` is built out of;
//! `load_acq_u32`/`load_acq_u64` back the reader-count and version-counter
//! reads in `dlb_shmem`, where a subsequent read of payload data must not be
//! reordered ahead of the load.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

/// Add `val` to `*cell` with relaxed ordering, returning the previous value.
#[inline]
pub fn add_rlx(cell: &AtomicI64, val: i64) -> i64 {
    cell.fetch_add(val, Ordering::Relaxed)
}

/// Load `*cell` with relaxed ordering.
#[inline]
pub fn load_rlx(cell: &AtomicI64) -> i64 {
    cell.load(Ordering::Relaxed)
}

/// Atomically read `*cell` and reset it to zero, with relaxed ordering.
/// Used to drain a per-thread timer into a macrosample.
#[inline]
pub fn exchange_rlx(cell: &AtomicI64, val: i64) -> i64 {
    cell.swap(val, Ordering::Relaxed)
}

/// Load a `u32` counter with acquire ordering (used for reader counts and
/// participant counts, where a subsequent read of payload data must not be
/// reordered ahead of this load).
#[inline]
pub fn load_acq_u32(cell: &AtomicU32) -> u32 {
    cell.load(Ordering::Acquire)
}

/// Load a `u64` version counter with acquire ordering.
#[inline]
pub fn load_acq_u64(cell: &AtomicU64) -> u64 {
    cell.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_rlx_returns_previous_value() {
        let cell = AtomicI64::new(10);
        assert_eq!(add_rlx(&cell, 5), 10);
        assert_eq!(load_rlx(&cell), 15);
    }

    #[test]
    fn exchange_rlx_drains_and_resets() {
        let cell = AtomicI64::new(42);
        assert_eq!(exchange_rlx(&cell, 0), 42);
        assert_eq!(load_rlx(&cell), 0);
    }

    #[test]
    fn load_acq_reads_current_value() {
        let cell = AtomicU32::new(3);
        assert_eq!(load_acq_u32(&cell), 3);

        let cell = AtomicU64::new(7);
        assert_eq!(load_acq_u64(&cell), 7);
    }
}
