//! The TALP shared region registry: a fixed-capacity table of per-region
//! timing slots, keyed by `(pid, name)`, queryable by any process on the
//! node without coordinating with the producer.
//!
//! Layout and the create-or-attach discipline mirror
//! `dlb_barrier::directory::BarrierDirectory` exactly: a single shared
//! segment, a `DirectoryHeader`-style state machine gating first-creator
//! initialisation, and a segment-wide mutex ordering structural changes.

use crate::error::{TalpError, TalpResult};
use dlb_common::shm_consts::{DLB_SHM_MAGIC, DEFAULT_REGIONS_PER_PROC, REGION_NAME_MAX};
use dlb_shmem::platform::{attach_segment_mmap, create_segment_mmap, LinuxMemoryConfig};
use dlb_shmem::sync::RawMutex;
use memmap2::MmapMut;
use static_assertions::const_assert_eq;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

const REGISTRY_VERSION: u32 = 1;

const UNINITIALIZED: u32 = 0;
const INITIALIZING: u32 = 1;
const READY: u32 = 2;

/// One row of the shared region registry.
///
/// `pid == 0` means the slot is free. `mpi_time`/`useful_time` are mutated
/// by the owning process with relaxed stores and observed by any sibling
/// with relaxed loads; no lock guards the payload fields themselves, only
/// slot allocation.
#[repr(C, align(64))]
pub struct RegionSlot {
    name_len: AtomicU32,
    name: std::cell::UnsafeCell<[u8; REGION_NAME_MAX]>,
    pid: AtomicU32,
    avg_cpus: AtomicU32,
    mpi_time: AtomicI64,
    useful_time: AtomicI64,
}

// SAFETY: every field is a plain atomic or an `UnsafeCell` byte buffer
// mutated only while holding the directory's segment mutex (for the name)
// or via atomics directly (the timers); sound to share across processes.
unsafe impl Sync for RegionSlot {}

const_assert_eq!(std::mem::size_of::<RegionSlot>() % 64, 0);

impl RegionSlot {
    fn raw_empty() -> Self {
        Self {
            name_len: AtomicU32::new(0),
            name: std::cell::UnsafeCell::new([0; REGION_NAME_MAX]),
            pid: AtomicU32::new(0),
            avg_cpus: AtomicU32::new(0),
            mpi_time: AtomicI64::new(0),
            useful_time: AtomicI64::new(0),
        }
    }

    /// `true` if no process owns this slot.
    pub fn is_free(&self) -> bool {
        self.pid.load(Ordering::Acquire) == 0
    }

    /// Region name, truncated to [`REGION_NAME_MAX`] bytes.
    pub fn name(&self) -> String {
        let len = self.name_len.load(Ordering::Acquire) as usize;
        let bytes = unsafe { &(*self.name.get())[..len] };
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// Owning pid, or `0` if free.
    pub fn pid(&self) -> u32 {
        self.pid.load(Ordering::Acquire)
    }

    fn init(&self, pid: u32, avg_cpus: u32, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(REGION_NAME_MAX);
        let buf = unsafe { &mut *self.name.get() };
        buf[..len].copy_from_slice(&bytes[..len]);
        buf[len..].fill(0);
        self.avg_cpus.store(avg_cpus, Ordering::Relaxed);
        self.mpi_time.store(0, Ordering::Relaxed);
        self.useful_time.store(0, Ordering::Relaxed);
        self.name_len.store(len as u32, Ordering::Release);
        self.pid.store(pid, Ordering::Release);
    }

    /// Read `(mpi_time_ns, useful_time_ns)` with relaxed atomics, no lock.
    pub fn times(&self) -> (i64, i64) {
        (
            self.mpi_time.load(Ordering::Relaxed),
            self.useful_time.load(Ordering::Relaxed),
        )
    }

    /// Write `(mpi_time_ns, useful_time_ns)` with relaxed atomics, no lock.
    pub fn set_times(&self, mpi_ns: i64, useful_ns: i64) {
        self.mpi_time.store(mpi_ns, Ordering::Relaxed);
        self.useful_time.store(useful_ns, Ordering::Relaxed);
    }
}

#[repr(C, align(64))]
struct DirectoryHeader {
    magic: u64,
    version: u32,
    capacity: u32,
    state: AtomicU32,
    mutex: RawMutex,
}

/// Shared segment hosting the node's TALP region registry.
pub struct TalpDirectory {
    mmap: MmapMut,
    capacity: usize,
    path: String,
}

fn directory_path(key: &str) -> String {
    if key.is_empty() {
        "/dev/shm/dlb_talp".to_string()
    } else {
        format!("/dev/shm/dlb_talp_{key}")
    }
}

fn page_align(size: usize) -> usize {
    const PAGE: usize = 4096;
    size.div_ceil(PAGE) * PAGE
}

impl TalpDirectory {
    /// Open (creating if necessary) the node's TALP region registry.
    pub fn open(key: &str, size_multiplier: u32) -> TalpResult<Self> {
        let capacity = DEFAULT_REGIONS_PER_PROC * size_multiplier.max(1) as usize;
        let path = directory_path(key);

        let header_size = std::mem::size_of::<DirectoryHeader>();
        let slots_size = capacity * std::mem::size_of::<RegionSlot>();
        let total_size = page_align(header_size + slots_size);

        let config = LinuxMemoryConfig::default();
        let mut mmap = if std::path::Path::new(&path).exists() {
            attach_segment_mmap(&path)?
        } else {
            create_segment_mmap(&path, total_size, &config)?
        };

        // SAFETY: header_size bytes at the front are reserved for
        // `DirectoryHeader` and never aliased by slot data.
        let header = unsafe { &mut *(mmap.as_mut_ptr() as *mut DirectoryHeader) };

        match header
            .state
            .compare_exchange(UNINITIALIZED, INITIALIZING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                header.magic = DLB_SHM_MAGIC;
                header.version = REGISTRY_VERSION;
                header.capacity = capacity as u32;
                header.mutex = RawMutex::new();

                let slots_ptr = unsafe { mmap.as_mut_ptr().add(header_size) as *mut RegionSlot };
                for i in 0..capacity {
                    unsafe {
                        std::ptr::write(slots_ptr.add(i), RegionSlot::raw_empty());
                    }
                }
                header.state.store(READY, Ordering::Release);
            }
            Err(_) => {
                while header.state.load(Ordering::Acquire) != READY {
                    std::thread::yield_now();
                }
                if header.magic != DLB_SHM_MAGIC || header.version != REGISTRY_VERSION {
                    return Err(TalpError::Shmem(dlb_shmem::ShmError::VersionMismatch));
                }
                if header.capacity as usize != capacity {
                    return Err(TalpError::Shmem(dlb_shmem::ShmError::SizeMismatch));
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

    /// Total region-slot capacity of this directory.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn header(&self) -> &DirectoryHeader {
        unsafe { &*(self.mmap.as_ptr() as *const DirectoryHeader) }
    }

    /// Every slot, free or occupied.
    pub fn slots(&self) -> &[RegionSlot] {
        let header_size = std::mem::size_of::<DirectoryHeader>();
        unsafe {
            let ptr = self.mmap.as_ptr().add(header_size) as *const RegionSlot;
            std::slice::from_raw_parts(ptr, self.capacity)
        }
    }

    /// Hold the segment mutex for the duration of `f`.
    pub fn with_segment_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        self.header().mutex.lock();
        let result = f();
        self.header().mutex.unlock();
        result
    }
}

/// Opaque reference to a shared region slot. Index-based, stable for the
/// life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(usize);

/// Node-local view of the shared TALP region registry.
pub struct TalpRegistry {
    directory: TalpDirectory,
}

impl TalpRegistry {
    /// Open (creating if this is the first process on the node) the TALP
    /// region registry for `key`, scaled by `size_multiplier`.
    pub fn init(key: &str, size_multiplier: u32) -> TalpResult<Self> {
        Ok(Self {
            directory: TalpDirectory::open(key, size_multiplier)?,
        })
    }

    /// Register `(pid, name)`, returning the existing slot if it already
    /// matches, or filling the first free slot. `NoMemory` if the
    /// registry is full.
    pub fn register(&self, pid: u32, avg_cpus: u32, name: &str) -> TalpResult<SlotId> {
        self.directory.with_segment_lock(|| {
            if let Some(idx) = self
                .directory
                .slots()
                .iter()
                .position(|s| !s.is_free() && s.pid() == pid && s.name() == name)
            {
                return Ok(SlotId(idx));
            }
            let free_idx = self
                .directory
                .slots()
                .iter()
                .position(|s| s.is_free())
                .ok_or(TalpError::NoMemory)?;
            self.directory.slots()[free_idx].init(pid, avg_cpus, name);
            Ok(SlotId(free_idx))
        })
    }

    /// Read `(mpi_time_ns, useful_time_ns)` of a slot, lock-free.
    pub fn get_times(&self, slot: SlotId) -> TalpResult<(i64, i64)> {
        Ok(self.slot(slot)?.times())
    }

    /// Write `(mpi_time_ns, useful_time_ns)` of a slot, lock-free.
    pub fn set_times(&self, slot: SlotId, mpi_ns: i64, useful_ns: i64) -> TalpResult<()> {
        self.slot(slot)?.set_times(mpi_ns, useful_ns);
        Ok(())
    }

    /// Every distinct pid with at least one registered slot, sorted
    /// ascending, enumerated under the segment lock.
    pub fn pid_list(&self) -> Vec<u32> {
        self.directory.with_segment_lock(|| {
            let mut pids: Vec<u32> = self
                .directory
                .slots()
                .iter()
                .filter(|s| !s.is_free())
                .map(|s| s.pid())
                .collect();
            pids.sort_unstable();
            pids.dedup();
            pids
        })
    }

    /// Every slot registered under `name`, sorted by pid, enumerated under
    /// the segment lock.
    pub fn region_list(&self, name: &str) -> Vec<SlotId> {
        self.directory.with_segment_lock(|| {
            let mut entries: Vec<(u32, usize)> = self
                .directory
                .slots()
                .iter()
                .enumerate()
                .filter(|(_, s)| !s.is_free() && s.name() == name)
                .map(|(idx, s)| (s.pid(), idx))
                .collect();
            entries.sort_unstable_by_key(|(pid, _)| *pid);
            entries.into_iter().map(|(_, idx)| SlotId(idx)).collect()
        })
    }

    /// Every slot owned by `pid`, regardless of region name, enumerated
    /// under the segment lock. Used by [`Self::get_times`]-style
    /// aggregation across every region a pid has registered.
    pub fn slots_for_pid(&self, pid: u32) -> Vec<SlotId> {
        self.directory.with_segment_lock(|| {
            self.directory
                .slots()
                .iter()
                .enumerate()
                .filter(|(_, s)| !s.is_free() && s.pid() == pid)
                .map(|(idx, _)| SlotId(idx))
                .collect()
        })
    }

    /// Read a slot's full `(pid, mpi_time_ns, useful_time_ns)` entry,
    /// lock-free. Used to enumerate node-wide times for a region name
    /// without losing which pid each entry belongs to.
    pub fn entry(&self, slot: SlotId) -> TalpResult<(u32, i64, i64)> {
        let slot = self.slot(slot)?;
        let (mpi, useful) = slot.times();
        Ok((slot.pid(), mpi, useful))
    }

    fn slot(&self, slot: SlotId) -> TalpResult<&RegionSlot> {
        self.directory
            .slots()
            .get(slot.0)
            .filter(|s| !s.is_free())
            .ok_or_else(|| TalpError::NoSuchRegion(format!("slot {}", slot.0)))
    }
}
