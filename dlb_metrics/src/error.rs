//! Error type for reduction and output-writer failures.

use thiserror::Error;

/// Errors raised by [`crate::output`] and, indirectly, [`crate::reduce`].
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Writing the output file failed; the caller should fall back to the
    /// log sink and emit a warning rather than abort.
    #[error("failed to write output file {path}: {source}")]
    Write {
        /// The path that could not be written.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization failed.
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Convenience alias.
pub type MetricsResult<T> = Result<T, MetricsError>;

impl From<MetricsError> for dlb_common::DlbError {
    fn from(err: MetricsError) -> Self {
        dlb_common::DlbError::Unknown(err.to_string())
    }
}
