//! Error type for the barrier registry.

use thiserror::Error;

/// Errors raised by [`crate::registry::BarrierRegistry`] and
/// [`crate::directory::BarrierDirectory`].
#[derive(Error, Debug)]
pub enum BarrierError {
    /// The requested operation would not change observable state (e.g.
    /// detaching a handle with no attached participant).
    #[error("operation was a no-op")]
    Noupdt,

    /// No barrier by this name or handle is registered.
    #[error("no such barrier: {0}")]
    NoEntry(String),

    /// The barrier directory is full; no free slot for a new name.
    #[error("no memory: barrier directory is full")]
    NoMemory,

    /// The per-barrier rw-lock timed out waiting on a presumed-hung peer.
    /// Fatal: the lock hierarchy gives no safe recovery.
    #[error("peer process appears to be hung holding the lock for barrier {0}")]
    PeerHung(String),

    /// Underlying shared-segment host error.
    #[error(transparent)]
    Shmem(#[from] dlb_shmem::ShmError),

    /// I/O failure underlying the directory's backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias.
pub type BarrierResult<T> = Result<T, BarrierError>;

impl From<BarrierError> for dlb_common::DlbError {
    fn from(err: BarrierError) -> Self {
        match err {
            BarrierError::Noupdt => dlb_common::DlbError::Noupdt,
            BarrierError::NoEntry(name) => dlb_common::DlbError::NoEntry(name),
            BarrierError::NoMemory => dlb_common::DlbError::NoMemory,
            BarrierError::PeerHung(name) => dlb_common::DlbError::PeerHung(name),
            BarrierError::Shmem(e) => dlb_common::DlbError::Unknown(e.to_string()),
            BarrierError::Io(e) => dlb_common::DlbError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noupdt_displays() {
        assert_eq!(BarrierError::Noupdt.to_string(), "operation was a no-op");
    }

    #[test]
    fn converts_into_canonical_error() {
        let err: dlb_common::DlbError = BarrierError::NoMemory.into();
        assert!(matches!(err, dlb_common::DlbError::NoMemory));
    }
}
