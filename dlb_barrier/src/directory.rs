//! The barrier directory: a single shared segment holding a fixed-capacity
//! array of [`BarrierSlot`]s, attached by every process on the node that
//! uses named barriers.
//!
//! Layout is `[DirectoryHeader][BarrierSlot; capacity]`, created by
//! whichever process attaches first and validated by every later attacher.

use crate::error::{BarrierError, BarrierResult};
use crate::slot::BarrierSlot;
use dlb_common::shm_consts::DLB_SHM_MAGIC;
use dlb_shmem::platform::{attach_segment_mmap, create_segment_mmap, LinuxMemoryConfig};
use dlb_shmem::sync::RawMutex;
use memmap2::MmapMut;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const DIRECTORY_VERSION: u32 = 1;
const DEFAULT_CAPACITY: usize = 32;

const UNINITIALIZED: u32 = 0;
const INITIALIZING: u32 = 1;
const READY: u32 = 2;

/// Header stamped at the front of the shared segment.
#[repr(C, align(64))]
struct DirectoryHeader {
    magic: u64,
    version: u32,
    capacity: u32,
    state: AtomicU32,
    /// Guards structural changes across the whole slot array: registering a
    /// new barrier, scanning by name, and the detach-time compaction.
    mutex: RawMutex,
}

/// Shared segment hosting the node's barrier directory.
pub struct BarrierDirectory {
    mmap: MmapMut,
    capacity: usize,
    path: String,
}

fn directory_path(key: &str) -> String {
    if key.is_empty() {
        "/dev/shm/dlb_barrier".to_string()
    } else {
        format!("/dev/shm/dlb_barrier_{key}")
    }
}

impl BarrierDirectory {
    /// Open (creating if necessary) the node's barrier directory.
    ///
    /// `size_multiplier` scales [`DEFAULT_CAPACITY`]; every process on the
    /// node must agree on `key` and `size_multiplier` or attach fails with
    /// [`BarrierError::Shmem`] (`SizeMismatch`/`VersionMismatch`).
    pub fn open(key: &str, size_multiplier: u32) -> BarrierResult<Self> {
        let capacity = DEFAULT_CAPACITY * size_multiplier.max(1) as usize;
        let path = directory_path(key);

        let header_size = std::mem::size_of::<DirectoryHeader>();
        let slots_size = capacity * std::mem::size_of::<BarrierSlot>();
        let total_size = page_align(header_size + slots_size);

        let config = LinuxMemoryConfig::default();
        let mut mmap = if std::path::Path::new(&path).exists() {
            attach_segment_mmap(&path)?
        } else {
            create_segment_mmap(&path, total_size, &config)?
        };

        // SAFETY: header_size bytes at the front of `total_size` are
        // reserved for `DirectoryHeader` and never aliased by slot data.
        let header = unsafe { &mut *(mmap.as_mut_ptr() as *mut DirectoryHeader) };

        match header
            .state
            .compare_exchange(UNINITIALIZED, INITIALIZING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                header.magic = DLB_SHM_MAGIC;
                header.version = DIRECTORY_VERSION;
                header.capacity = capacity as u32;
                header.mutex = RawMutex::new();

                let slots_ptr =
                    unsafe { mmap.as_mut_ptr().add(header_size) as *mut BarrierSlot };
                for i in 0..capacity {
                    unsafe {
                        std::ptr::write(slots_ptr.add(i), BarrierSlot::raw_empty());
                    }
                }
                header.state.store(READY, Ordering::Release);
            }
            Err(_) => {
                while header.state.load(Ordering::Acquire) != READY {
                    std::thread::yield_now();
                }
                if header.magic != DLB_SHM_MAGIC || header.version != DIRECTORY_VERSION {
                    return Err(BarrierError::Shmem(dlb_shmem::ShmError::VersionMismatch));
                }
                if header.capacity as usize != capacity {
                    return Err(BarrierError::Shmem(dlb_shmem::ShmError::SizeMismatch));
                }
            }
        }

        Ok(Self {
            mmap,
            capacity,
            path,
        })
    }

    /// Path of the backing file, exposed for diagnostics.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Total barrier capacity of this directory.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn header(&self) -> &DirectoryHeader {
        unsafe { &*(self.mmap.as_ptr() as *const DirectoryHeader) }
    }

    /// Every slot, free or occupied.
    pub fn slots(&self) -> &[BarrierSlot] {
        let header_size = std::mem::size_of::<DirectoryHeader>();
        unsafe {
            let ptr = self.mmap.as_ptr().add(header_size) as *const BarrierSlot;
            std::slice::from_raw_parts(ptr, self.capacity)
        }
    }

    /// Hold the segment mutex for the duration of `f`, ordering registration
    /// and teardown across every attached process.
    pub fn with_segment_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        self.header().mutex.lock();
        let result = f();
        self.header().mutex.unlock();
        result
    }
}

fn page_align(size: usize) -> usize {
    const PAGE: usize = 4096;
    size.div_ceil(PAGE) * PAGE
}

/// Timeout applied to per-barrier rw-lock acquisition; exceeding it is
/// fatal.
pub const LOCK_TIMEOUT: Duration = dlb_common::shm_consts::BARRIER_LOCK_TIMEOUT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_directory_with_default_capacity() {
        let key = format!("test_open_{}", std::process::id());
        let dir = BarrierDirectory::open(&key, 1).unwrap();
        assert_eq!(dir.capacity(), DEFAULT_CAPACITY);
        assert!(dir.slots().iter().all(|s| s.is_free()));
        let _ = std::fs::remove_file(dir.path());
    }

    #[test]
    fn size_multiplier_scales_capacity() {
        let key = format!("test_scale_{}", std::process::id());
        let dir = BarrierDirectory::open(&key, 4).unwrap();
        assert_eq!(dir.capacity(), DEFAULT_CAPACITY * 4);
        let _ = std::fs::remove_file(dir.path());
    }

    #[test]
    fn second_attach_reuses_the_same_segment() {
        let key = format!("test_reuse_{}", std::process::id());
        let dir1 = BarrierDirectory::open(&key, 1).unwrap();
        dir1.slots()[0].init("shared", false);

        let dir2 = BarrierDirectory::open(&key, 1).unwrap();
        assert_eq!(dir2.slots()[0].name(), "shared");
        let _ = std::fs::remove_file(dir1.path());
    }

    #[test]
    fn mismatched_size_multiplier_is_rejected() {
        let key = format!("test_mismatch_{}", std::process::id());
        let _dir1 = BarrierDirectory::open(&key, 1).unwrap();
        let dir2 = BarrierDirectory::open(&key, 2);
        assert!(matches!(
            dir2,
            Err(BarrierError::Shmem(dlb_shmem::ShmError::SizeMismatch))
        ));
        let _ = std::fs::remove_file(directory_path(&key));
    }
}
