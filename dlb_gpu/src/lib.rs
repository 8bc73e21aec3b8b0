//! Vendor-agnostic GPU activity collection for node-local profiling.
//!
//! A GPU vendor's runtime (CUDA, ROCm, oneAPI, ...) never appears as a type
//! in this crate's public API. Instead a collaborator implements
//! [`GpuPlugin`] against its own SDK and installs one instance per process
//! into a [`GpuSampleCollector`]. The collector merges whatever kernel and
//! memory-copy intervals the plugin reports into a single per-process
//! [`GpuMeasurements`] total, ready to be folded into a macrosample at
//! region boundaries.
#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod activity;
pub mod collector;
pub mod error;
pub mod plugin;

pub use activity::{exclusive_duration, merge_intervals, total_duration, ActivityKind, ActivityRecord};
pub use collector::GpuSampleCollector;
pub use error::{GpuError, GpuResult};
pub use plugin::{CpuAffinity, GpuMeasurements, GpuPlugin};
