//! dlb_common
//!
//! Ambient stack shared by every crate in the profiling substrate: the error
//! taxonomy, configuration loading, shared-memory sizing constants and the
//! lock-free atomic / monotonic-clock helpers that `dlb_shmem`, `dlb_barrier`
//! and `dlb_talp` are all built on top of.
//!
//! # Module Structure
//!
//! - [`error`] - canonical error taxonomy
//! - [`config`] - `ConfigLoader` trait and [`config::TalpConfig`]
//! - [`shm_consts`] - shared-memory sizing/alignment constants
//! - [`atomic`] - relaxed/acquire atomic helper functions
//! - [`clock`] - monotonic nanosecond clock

pub mod atomic;
pub mod clock;
pub mod config;
pub mod error;
pub mod shm_consts;

pub use error::{DlbError, DlbResult};
