//! Error type for the GPU sample collector.

use thiserror::Error;

/// Errors raised by [`crate::collector::GpuSampleCollector`].
///
/// GPU plugin failures are logged as warnings by the caller and never
/// propagate into TALP's own measurement state: this type
/// exists for completeness and for plugin-installation bookkeeping, not
/// because a missing/broken plugin should abort anything.
#[derive(Error, Debug)]
pub enum GpuError {
    /// A plugin was already installed; only one may be active per process.
    #[error("a GPU plugin is already installed")]
    AlreadyInstalled,

    /// No plugin has been installed; queries that require one are no-ops.
    #[error("no GPU plugin installed")]
    NoPlugin,
}

/// Convenience alias.
pub type GpuResult<T> = Result<T, GpuError>;
