//! Configuration loading traits and types.
//!
//! Provides a standardized way to load the TOML configuration recognised by
//! the profiling substrate (`talp`, `talp-external-profiler`, `shm-key`, the
//! barrier flags, …) across every binary that links against it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use dlb_common::config::{ConfigLoader, TalpConfig};
//! use std::path::Path;
//!
//! let config = TalpConfig::load(Path::new("dlb.toml")).expect("load config");
//! config.validate().expect("valid config");
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Which POP efficiency formula variant to compute; see `dlb_metrics::pop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TalpModel {
    /// Ver. 1: all metrics multiplicative, some can exceed 1.
    HybridV1,
    /// Ver. 2: parallel efficiency is not the product of MPI and OpenMP efficiency.
    HybridV2,
}

impl Default for TalpModel {
    fn default() -> Self {
        TalpModel::HybridV2
    }
}

/// Subset of summaries to compute/print at finalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TalpSummary {
    /// Node-collective POP efficiency metrics.
    PopMetrics,
    /// Per-node useful/mpi time breakdown.
    Node,
    /// Per-process useful/mpi time breakdown.
    Process,
}

/// Top-level configuration recognised by the profiling substrate.
///
/// Mirrors the flags enumerated in the external-interfaces section of the
/// design: every option is independently toggleable and unknown keys are
/// rejected rather than silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TalpConfig {
    /// Enable the profiling core at all.
    #[serde(default = "default_true")]
    pub talp: bool,

    /// Mirror region times into the shared slot on every update, instead of
    /// only at region stop.
    #[serde(default)]
    pub talp_external_profiler: bool,

    /// Collect hardware cycle/instruction counters (requires the `papi`
    /// cargo feature; otherwise rejected by [`TalpConfig::validate`]).
    #[serde(default)]
    pub talp_papi: bool,

    /// Which summaries to compute at finalisation.
    #[serde(default = "default_summary")]
    pub talp_summary: Vec<TalpSummary>,

    /// Region-selection filter, e.g. `"exclude:Private"`.
    #[serde(default)]
    pub talp_region_select: Option<String>,

    /// Output file path; extension selects the writer. `None` prints to the
    /// log sink.
    #[serde(default)]
    pub talp_output_file: Option<String>,

    /// POP formula variant.
    #[serde(default)]
    pub talp_model: TalpModel,

    /// Segment name suffix, isolates concurrent test runs from each other.
    #[serde(default = "default_shm_key")]
    pub shm_key: String,

    /// Capacity scaling factor for shared segments.
    #[serde(default = "default_shm_size_multiplier")]
    pub shm_size_multiplier: u32,

    /// Enable the shared-barrier subsystem.
    #[serde(default = "default_true")]
    pub barrier: bool,

    /// Treat barrier crossings as LeWI lend/reclaim points.
    #[serde(default)]
    pub lewi_barrier: bool,

    /// Comma-separated list of barrier names that opt into `lewi_barrier`
    /// when it is not unconditionally enabled.
    #[serde(default)]
    pub lewi_barrier_select: Option<String>,

    /// Fixed barrier id to use instead of auto-registering by name.
    #[serde(default)]
    pub barrier_id: Option<i32>,
}

fn default_true() -> bool {
    true
}

fn default_summary() -> Vec<TalpSummary> {
    vec![TalpSummary::PopMetrics]
}

fn default_shm_key() -> String {
    String::new()
}

fn default_shm_size_multiplier() -> u32 {
    1
}

impl Default for TalpConfig {
    fn default() -> Self {
        TalpConfig {
            talp: default_true(),
            talp_external_profiler: false,
            talp_papi: false,
            talp_summary: default_summary(),
            talp_region_select: None,
            talp_output_file: None,
            talp_model: TalpModel::default(),
            shm_key: default_shm_key(),
            shm_size_multiplier: default_shm_size_multiplier(),
            barrier: default_true(),
            lewi_barrier: false,
            lewi_barrier_select: None,
            barrier_id: None,
        }
    }
}

impl TalpConfig {
    /// Validate semantic constraints beyond what serde/TOML already enforce.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `talp_papi` is set without the `papi` cargo feature compiled in
    /// - `shm_size_multiplier` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.talp_papi && !cfg!(feature = "papi") {
            return Err(ConfigError::ValidationError(
                "talp-papi=yes requires the `papi` cargo feature".to_string(),
            ));
        }
        if self.shm_size_multiplier == 0 {
            return Err(ConfigError::ValidationError(
                "shm-size-multiplier must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for any `serde::de::DeserializeOwned` type, exactly
/// like the host workspace's own `ConfigLoader`.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_validates() {
        assert!(TalpConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_multiplier_rejected() {
        let mut config = TalpConfig::default();
        config.shm_size_multiplier = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn load_missing_file_is_file_not_found() {
        let result = TalpConfig::load(Path::new("/nonexistent/dlb.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn load_round_trips_through_toml() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"
                talp = true
                talp_model = "hybrid-v1"
                shm_key = "test"
                shm_size_multiplier = 4
            "#,
        )
        .unwrap();
        let config = TalpConfig::load(file.path()).unwrap();
        assert_eq!(config.talp_model, TalpModel::HybridV1);
        assert_eq!(config.shm_key, "test");
        assert_eq!(config.shm_size_multiplier, 4);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "not_a_real_field = 1\n").unwrap();
        assert!(TalpConfig::load(file.path()).is_err());
    }
}
