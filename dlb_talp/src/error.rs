//! Error type for the TALP sample engine, region store and shared registry.

use thiserror::Error;

/// Errors raised by [`crate::store::RegionStore`], [`crate::sample`] and
/// [`crate::shmem_registry::TalpRegistry`].
#[derive(Error, Debug)]
pub enum TalpError {
    /// The requested operation would not change observable state: starting
    /// an already-started region, stopping a not-started one, or any
    /// operation on a region excluded by the region-select filter.
    #[error("operation was a no-op")]
    Noupdt,

    /// No region or shared slot by this name or handle exists.
    #[error("no such region: {0}")]
    NoSuchRegion(String),

    /// A fixed-capacity structure (shared region slots, thread-sample
    /// array) is full.
    #[error("no memory: capacity exhausted")]
    NoMemory,

    /// An observer thread attempted to mutate measurement state.
    #[error("permission denied: observers may not mutate measurement state")]
    Permission,

    /// The shared region registry was never attached (`talp-external-profiler=no`),
    /// so no cross-process query can be answered.
    #[error("TALP shared registry not attached")]
    NoTalp,

    /// Allocation of a thread sample failed. Fatal: instrumentation cannot
    /// proceed without per-thread storage.
    #[error("failed to allocate thread sample")]
    SampleAllocation,

    /// Underlying shared-segment host error.
    #[error(transparent)]
    Shmem(#[from] dlb_shmem::ShmError),

    /// I/O failure underlying the shared registry's backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias.
pub type TalpResult<T> = Result<T, TalpError>;

impl From<TalpError> for dlb_common::DlbError {
    fn from(err: TalpError) -> Self {
        match err {
            TalpError::Noupdt => dlb_common::DlbError::Noupdt,
            TalpError::NoSuchRegion(name) => dlb_common::DlbError::NoEntry(name),
            TalpError::NoMemory => dlb_common::DlbError::NoMemory,
            TalpError::Permission => dlb_common::DlbError::Permission,
            TalpError::NoTalp => dlb_common::DlbError::NoTalp,
            TalpError::SampleAllocation => {
                dlb_common::DlbError::Init("thread sample allocation failed".to_string())
            }
            TalpError::Shmem(e) => dlb_common::DlbError::Unknown(e.to_string()),
            TalpError::Io(e) => dlb_common::DlbError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noupdt_displays() {
        assert_eq!(TalpError::Noupdt.to_string(), "operation was a no-op");
    }

    #[test]
    fn converts_into_canonical_error() {
        let err: dlb_common::DlbError = TalpError::Permission.into();
        assert!(matches!(err, dlb_common::DlbError::Permission));
    }
}
