//! Canonical error taxonomy shared across the profiling substrate.
//!
//! Every crate (`dlb_shmem`, `dlb_barrier`, `dlb_talp`, `dlb_gpu`, `dlb_metrics`)
//! defines its own `thiserror`-derived error enum for its own operations, but all
//! of them converge onto the discriminants below via [`DlbError::from`] impls so
//! a caller juggling several subsystems can match on one type.

use thiserror::Error;

/// Canonical error returned by the profiling substrate.
///
/// Unlike the original library, which aborts the process on fatal conditions,
/// these are ordinary typed errors: the decision to abort belongs to the
/// caller (see [`crate::error::dlb_fatal`]).
#[derive(Debug, Error)]
pub enum DlbError {
    /// Idempotent no-op: the requested operation would not change observable
    /// state (e.g. starting an already-started region).
    #[error("operation was a no-op")]
    Noupdt,

    /// No entry found for the given key (region name, barrier name, pid).
    #[error("no such entry: {0}")]
    NoEntry(String),

    /// A fixed-capacity shared structure (region slots, barrier slots) is full.
    #[error("no memory: capacity exhausted")]
    NoMemory,

    /// The shared segment does not exist (e.g. a sibling process queried
    /// before the producer has attached).
    #[error("shared memory segment not found: {0}")]
    NoShmem(String),

    /// The referenced process does not exist, or is not attached.
    #[error("no such process: {0}")]
    NoProc(u32),

    /// TALP has not been initialised for this process.
    #[error("TALP is not initialized")]
    NoTalp,

    /// The requested feature was compiled out (e.g. PAPI support).
    #[error("feature not compiled in: {0}")]
    NoComp(&'static str),

    /// An observer thread or process attempted a mutating operation.
    #[error("permission denied: observers may not mutate measurement state")]
    Permission,

    /// Re-initialisation or a version mismatch between a shared segment and
    /// the library that opened it. Fatal at startup.
    #[error("initialization error: {0}")]
    Init(String),

    /// A per-barrier rw-lock timed out waiting on a presumed-hung peer.
    /// Fatal: there is no safe recovery.
    #[error("peer process appears to be hung holding a barrier lock: {0}")]
    PeerHung(String),

    /// I/O failure underlying a shared-memory or output-file operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A POSIX system call failed.
    #[error("system call failed: {0}")]
    Nix(#[from] nix::Error),

    /// Anything not covered above.
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Convenience alias used throughout the workspace.
pub type DlbResult<T> = Result<T, DlbError>;

/// Log a fatal condition and abort the process, mirroring the original
/// library's "configuration/version/allocation failures are fatal" policy.
///
/// The library itself never calls this: it always returns a [`DlbError`].
/// Call sites that want the original library's fail-fast behaviour invoke
/// this explicitly after observing a fatal-class error (`Init`, `NoMemory`
/// during startup, `PeerHung`).
pub fn dlb_fatal(err: &DlbError) -> ! {
    tracing::error!(error = %err, "fatal error, aborting");
    panic!("dlb: fatal error: {err}");
}
