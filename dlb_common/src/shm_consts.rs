//! Shared-memory sizing and alignment constants.
//!
//! Single source of truth for `dlb_shmem`, `dlb_barrier` and `dlb_talp`.

/// Minimum shared memory segment size in bytes (one memory page).
pub const SHM_MIN_SIZE: usize = 4096;

/// Maximum shared memory segment size in bytes.
pub const SHM_MAX_SIZE: usize = 1_073_741_824; // 1GB

/// CPU cache line size in bytes, used to avoid false sharing between slots.
pub const CACHE_LINE_SIZE: usize = 64;

/// Maximum length, in bytes, of a region name stored in a shared slot.
pub const REGION_NAME_MAX: usize = 128;

/// Maximum length, in bytes, of a barrier name stored in a shared slot.
pub const BARRIER_NAME_MAX: usize = 32;

/// Default number of region slots allocated per attached process when the
/// full (non-minimal) TALP shared memory is requested.
pub const DEFAULT_REGIONS_PER_PROC: usize = 100;

/// Timeout applied to per-barrier rw-lock acquisition. Expiry is fatal: see
/// `dlb_barrier::registry`.
pub const BARRIER_LOCK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// Magic number stamped into every segment header, gating attach against a
/// foreign or stale layout. Bump whenever `SegmentHeader`'s layout changes.
pub const DLB_SHM_MAGIC: u64 = 0x444c_4254_414c_5001; // "DLBTALP" + layout rev 1

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_constraints() {
        assert!(SHM_MIN_SIZE < SHM_MAX_SIZE);
        assert!(SHM_MIN_SIZE > 0);
        assert_eq!(SHM_MIN_SIZE % CACHE_LINE_SIZE, 0);
    }

    #[test]
    fn barrier_timeout_is_one_second() {
        assert_eq!(BARRIER_LOCK_TIMEOUT.as_secs(), 1);
    }
}
