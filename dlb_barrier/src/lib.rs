//! # dlb_barrier
//!
//! Named, reference-counted, process-shared barriers whose participant
//! count mutates dynamically while processes attach and detach.
//!
//! Built directly on [`dlb_shmem`]'s raw process-shared synchronisation
//! primitives ([`dlb_shmem::sync::RawMutex`], [`dlb_shmem::sync::RawRwLock`],
//! [`dlb_shmem::sync::RawBarrier`]) and its mmap platform glue; this crate
//! supplies only the barrier-slot layout and the segment-mutex-then-
//! per-barrier-lock registry discipline on top.
//!
//! ## Lock hierarchy
//!
//! The segment mutex (one per directory) always outranks a barrier's own
//! rw-lock: structural operations (register/attach/detach) take the segment
//! mutex first, then the slot's write lock with a one-second timeout.
//! [`BarrierRegistry::barrier`] only ever takes the slot's read lock. This
//! order is never violated, which is what rules out deadlock between
//! concurrent registrations and in-flight crossings.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dlb_barrier::BarrierRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = BarrierRegistry::init("demo", 1)?;
//! let handle = registry.register("compute_phase", false)?;
//! registry.barrier(handle)?;
//! registry.detach(handle)?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod directory;
pub mod error;
pub mod registry;
pub mod slot;

pub use error::{BarrierError, BarrierResult};
pub use registry::{BarrierHandle, BarrierRegistry};
pub use slot::BarrierSlot;
