//! Error type for shared-segment host operations.

use thiserror::Error;

/// Errors raised by [`crate::segment`], [`crate::reader`], [`crate::writer`],
/// [`crate::lifecycle`] and [`crate::discovery`].
#[derive(Error, Debug)]
pub enum ShmError {
    /// A segment with this name already exists.
    #[error("segment already exists: {name}")]
    AlreadyExists {
        /// Segment name.
        name: String,
    },

    /// No segment with this name could be found.
    #[error("segment not found: {name}")]
    NotFound {
        /// Segment name.
        name: String,
    },

    /// A requested size fell outside `SHM_MIN_SIZE..=SHM_MAX_SIZE`, or was not
    /// page-aligned.
    #[error("invalid segment size: {size}")]
    InvalidSize {
        /// The rejected size.
        size: usize,
    },

    /// A reader's bounded retry loop exhausted its attempts without
    /// observing a stable version.
    #[error("version conflict: too many retries observed a writer in progress")]
    VersionConflict,

    /// The on-disk segment version does not match the library's compiled
    /// version. Fatal at startup.
    #[error("version mismatch: segment predates or postdates this build")]
    VersionMismatch,

    /// Two clients disagree on the segment's capacity.
    #[error("segment size mismatch")]
    SizeMismatch,

    /// Permission denied opening or removing a segment file.
    #[error("permission denied: {name}")]
    PermissionDenied {
        /// Segment name.
        name: String,
    },

    /// A fixed-capacity structure is full.
    #[error("resource exhausted")]
    ResourceExhausted,

    /// A deadline was exceeded (currently unused outside `dlb_barrier`, kept
    /// for parity with the originating project's error surface).
    #[error("deadline violated: {operation}")]
    DeadlineViolation {
        /// Name of the operation that exceeded its deadline.
        operation: String,
    },

    /// A pointer/offset failed cache-line alignment validation.
    #[error("alignment error: address {address} not aligned to {alignment}")]
    AlignmentError {
        /// The misaligned address.
        address: usize,
        /// Required alignment.
        alignment: usize,
    },

    /// The referenced process could not be found (e.g. querying liveness of
    /// an unknown pid).
    #[error("process not found: {pid}")]
    ProcessNotFound {
        /// Offending pid.
        pid: u32,
    },

    /// I/O failure underlying a segment or metadata-file operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A POSIX system call failed.
    #[error("system call failed: {0}")]
    Nix(#[from] nix::Error),

    /// Failure (de)serialising the JSON metadata sidecar file.
    #[error("metadata (de)serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias.
pub type ShmResult<T> = Result<T, ShmError>;
