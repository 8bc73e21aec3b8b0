//! # dlb_shmem
//!
//! Named, versioned, process-shared memory segments with lifecycle and
//! cleanup hooks.
//!
//! This crate is the bottom layer of the profiling substrate: it knows how
//! to create, attach to, version and tear down a POSIX shared memory segment
//! identified by a short name, but nothing about barriers or profiling
//! regions. [`dlb_barrier`](../dlb_barrier) and `dlb_talp` lay typed,
//! cache-line-aligned slot arrays over the payload region this crate hands
//! back.
//!
//! ## Concurrency model
//!
//! Every segment is single-writer, multi-reader. The writer bumps an
//! even/odd [`version::VersionCounter`] around every payload write; readers
//! snapshot the version before and after copying the payload and retry (up
//! to a fixed bound) if either the version changed mid-copy or was odd to
//! begin with. No lock is held during a read.
//!
//! ## Usage
//!
//! ```rust
//! use dlb_shmem::{SegmentWriter, SegmentReader, SHM_MIN_SIZE};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = SegmentWriter::create("demo_region_directory", SHM_MIN_SIZE)?;
//! writer.write(b"payload bytes")?;
//!
//! let mut reader = SegmentReader::attach("demo_region_directory")?;
//! let data = reader.read()?;
//! assert_eq!(&data[..13], b"payload bytes");
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod reader;
pub mod segment;
pub mod sync;
pub mod version;
pub mod writer;

pub use discovery::{DiscoveryStats, SegmentDiscovery, SegmentInfo};
pub use error::{ShmError, ShmResult};
pub use lifecycle::{SegmentCleanup, SegmentMetadata, ShmLifecycleManager};
pub use reader::SegmentReader;
pub use segment::{SegmentHeader, SharedMemorySegment};
pub use sync::{LockTimeout, RawBarrier, RawMutex, RawRwLock};
pub use version::VersionCounter;
pub use writer::SegmentWriter;

pub use dlb_common::shm_consts::{SHM_MAX_SIZE, SHM_MIN_SIZE};

/// Install a `tracing` subscriber reading `RUST_LOG`, suitable for both
/// CLI tools and long-running daemons linking this crate.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
