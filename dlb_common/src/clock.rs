//! Monotonic nanosecond clock.
//!
//! The profiling substrate never reads the wall clock: every timer is a
//! delta between two monotonic timestamps, exactly as the original library's
//! `get_time_in_ns()` (backed by `CLOCK_MONOTONIC`).

use nix::time::{clock_gettime, ClockId};

/// Sentinel meaning "take a fresh timestamp now" rather than a caller-supplied
/// one, mirroring the original `TALP_NO_TIMESTAMP`.
pub const NO_TIMESTAMP: i64 = -1;

/// Current monotonic time in nanoseconds since an unspecified epoch.
///
/// Only differences between two calls are meaningful.
pub fn now_ns() -> i64 {
    let ts = clock_gettime(ClockId::CLOCK_MONOTONIC).expect("CLOCK_MONOTONIC unavailable");
    ts.tv_sec() * 1_000_000_000 + ts.tv_nsec()
}

/// Resolve a possibly-sentinel timestamp into a concrete one.
#[inline]
pub fn resolve(timestamp: i64) -> i64 {
    if timestamp == NO_TIMESTAMP {
        now_ns()
    } else {
        timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ns_is_monotonic() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }

    #[test]
    fn resolve_passes_through_concrete_timestamp() {
        assert_eq!(resolve(12345), 12345);
    }

    #[test]
    fn resolve_sentinel_takes_fresh_timestamp() {
        let before = now_ns();
        let resolved = resolve(NO_TIMESTAMP);
        assert!(resolved >= before);
    }
}
