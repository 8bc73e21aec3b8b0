//! Shared memory segment structures and operations.

use crate::error::{ShmError, ShmResult};
use crate::version::VersionCounter;
use dlb_common::shm_consts::{CACHE_LINE_SIZE, DLB_SHM_MAGIC, SHM_MAX_SIZE, SHM_MIN_SIZE};
use memmap2::MmapMut;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Segment header with cache-line alignment. Every named segment this crate
/// creates (barrier directory, TALP region directory, …) is laid out as
/// `[SegmentHeader][payload bytes]`.
#[repr(C, align(64))]
pub struct SegmentHeader {
    /// Magic number gating attach against a foreign or stale layout.
    pub magic: u64,
    /// Optimistic-concurrency version counter over the whole payload.
    pub version: AtomicU64,
    /// pid of the process that created the segment.
    pub writer_pid: AtomicU32,
    /// Number of processes currently attached as readers.
    pub reader_count: AtomicU32,
    /// Payload size in bytes (excludes this header).
    pub size: u64,
    /// Creation timestamp, monotonic nanoseconds.
    pub created_ts: u64,
    /// Timestamp of the most recent payload write.
    pub last_write_ts: AtomicU64,
    /// Reserved for a future payload checksum; unused today.
    pub checksum: AtomicU32,
    /// Padding out to a whole number of cache lines.
    _padding: [u8; 64],
}

impl SegmentHeader {
    /// Build a fresh header for a segment of `size` payload bytes.
    pub fn new(size: usize, writer_pid: u32) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;

        Self {
            magic: DLB_SHM_MAGIC,
            version: AtomicU64::new(0),
            writer_pid: AtomicU32::new(writer_pid),
            reader_count: AtomicU32::new(0),
            size: size as u64,
            created_ts: now,
            last_write_ts: AtomicU64::new(now),
            checksum: AtomicU32::new(0),
            _padding: [0; 64],
        }
    }

    /// Reject a header that was not created by this build.
    pub fn validate(&self) -> ShmResult<()> {
        if self.magic != DLB_SHM_MAGIC {
            return Err(ShmError::VersionMismatch);
        }
        Ok(())
    }

    /// Borrow the header's version counter in place, over the same
    /// `AtomicU64` every reader/writer on the segment shares.
    pub fn version_counter(&self) -> &VersionCounter {
        // SAFETY: `VersionCounter` is `repr(transparent)` over `AtomicU64`.
        unsafe { &*(&self.version as *const AtomicU64 as *const VersionCounter) }
    }

    /// Register a new reader, returning the previous count.
    pub fn add_reader(&self) -> u32 {
        self.reader_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Deregister a reader, returning the previous count.
    pub fn remove_reader(&self) -> u32 {
        self.reader_count.fetch_sub(1, Ordering::AcqRel)
    }

    /// Current reader count.
    pub fn get_reader_count(&self) -> u32 {
        dlb_common::atomic::load_acq_u32(&self.reader_count)
    }
}

/// A named shared memory segment: a header plus an opaque payload region.
/// `dlb_barrier` and `dlb_talp` lay typed slot arrays over the payload.
pub struct SharedMemorySegment {
    /// Segment name, as passed to [`crate::writer::SegmentWriter::create`].
    pub name: String,
    /// Total mapped size, header included.
    pub total_size: usize,
    /// Payload size, header excluded.
    pub data_size: usize,
    mmap: MmapMut,
}

impl SharedMemorySegment {
    /// Wrap an existing mapping, validating size and header alignment.
    pub fn new(name: String, data_size: usize, mmap: MmapMut) -> ShmResult<Self> {
        validate_segment_size(data_size)?;
        validate_memory_alignment(mmap.as_ptr() as usize)?;

        Ok(Self {
            name,
            total_size: data_size + std::mem::size_of::<SegmentHeader>(),
            data_size,
            mmap,
        })
    }

    /// Borrow the header.
    pub fn header(&self) -> &SegmentHeader {
        unsafe { &*(self.mmap.as_ptr() as *const SegmentHeader) }
    }

    /// Mutably borrow the header. Writer side only.
    pub fn header_mut(&mut self) -> &mut SegmentHeader {
        unsafe { &mut *(self.mmap.as_mut_ptr() as *mut SegmentHeader) }
    }

    /// Pointer to the start of the payload region.
    pub fn data_ptr(&self) -> *const u8 {
        unsafe { self.mmap.as_ptr().add(std::mem::size_of::<SegmentHeader>()) }
    }

    /// Mutable pointer to the start of the payload region. Writer side only.
    pub fn data_ptr_mut(&mut self) -> *mut u8 {
        unsafe {
            self.mmap
                .as_mut_ptr()
                .add(std::mem::size_of::<SegmentHeader>())
        }
    }

    /// Payload region as a byte slice.
    pub fn data(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data_ptr(), self.data_size) }
    }

    /// Payload region as a mutable byte slice. Writer side only.
    pub fn data_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.data_ptr_mut(), self.data_size) }
    }
}

/// Reject payload sizes outside `SHM_MIN_SIZE..=SHM_MAX_SIZE` or not a whole
/// number of pages.
pub fn validate_segment_size(size: usize) -> ShmResult<()> {
    if size < SHM_MIN_SIZE || size > SHM_MAX_SIZE || size % SHM_MIN_SIZE != 0 {
        return Err(ShmError::InvalidSize { size });
    }
    Ok(())
}

/// Reject addresses not aligned to [`CACHE_LINE_SIZE`].
pub fn validate_memory_alignment(address: usize) -> ShmResult<()> {
    if address % CACHE_LINE_SIZE != 0 {
        return Err(ShmError::AlignmentError {
            address,
            alignment: CACHE_LINE_SIZE,
        });
    }
    Ok(())
}

/// Memory prefetch strategies for hot paths (sample flush, barrier crossing).
pub mod prefetch {
    use dlb_common::shm_consts::CACHE_LINE_SIZE;

    /// Locality hint passed to the prefetch instruction.
    pub enum PrefetchHint {
        /// Data will be read again soon (T0).
        Temporal,
        /// Data will be read exactly once (NTA).
        NonTemporal,
        /// Moderate locality (T1).
        Moderate,
        /// Low locality (T2).
        Low,
    }

    #[cfg(target_arch = "x86_64")]
    #[allow(dead_code)]
    pub fn prefetch_read(addr: *const u8, size: usize, hint: PrefetchHint) {
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};

        unsafe {
            let mut ptr = addr;
            let end = addr.add(size);
            while ptr < end {
                match hint {
                    PrefetchHint::Temporal => _mm_prefetch(ptr as *const i8, _MM_HINT_T0),
                    PrefetchHint::NonTemporal => _mm_prefetch(ptr as *const i8, 0),
                    PrefetchHint::Moderate => _mm_prefetch(ptr as *const i8, 1),
                    PrefetchHint::Low => _mm_prefetch(ptr as *const i8, 2),
                }
                ptr = ptr.add(CACHE_LINE_SIZE);
            }
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    #[allow(dead_code)]
    pub fn prefetch_read(_addr: *const u8, _size: usize, _hint: PrefetchHint) {}

    /// Prefetch a segment header ahead of an imminent read.
    #[allow(dead_code)]
    pub fn prefetch_header(header: *const super::SegmentHeader) {
        prefetch_read(
            header as *const u8,
            std::mem::size_of::<super::SegmentHeader>(),
            PrefetchHint::Temporal,
        );
    }

    /// Prefetch a payload region that will be scanned once (e.g. a flush pass
    /// over every slot).
    #[allow(dead_code)]
    pub fn prefetch_data_streaming(data_ptr: *const u8, size: usize) {
        prefetch_read(data_ptr, size, PrefetchHint::NonTemporal);
    }

    /// Prefetch a payload region that will be revisited repeatedly.
    #[allow(dead_code)]
    pub fn prefetch_data_cached(data_ptr: *const u8, size: usize) {
        prefetch_read(data_ptr, size, PrefetchHint::Temporal);
    }
}

/// Cache-friendly layout helpers used when packing slot arrays into a
/// payload region (barrier directory, TALP region directory).
pub mod cache {
    use dlb_common::shm_consts::CACHE_LINE_SIZE;

    /// Round a pointer up to the next cache line boundary.
    #[allow(dead_code)]
    pub fn align_to_cache_line(ptr: *const u8) -> *const u8 {
        let addr = ptr as usize;
        ((addr + CACHE_LINE_SIZE - 1) & !(CACHE_LINE_SIZE - 1)) as *const u8
    }

    /// Round a size up to a whole number of cache lines.
    #[allow(dead_code)]
    pub fn cache_aligned_size(size: usize) -> usize {
        (size + CACHE_LINE_SIZE - 1) & !(CACHE_LINE_SIZE - 1)
    }

    /// `true` if `ptr` sits on a cache line boundary.
    #[allow(dead_code)]
    pub fn is_cache_aligned(ptr: *const u8) -> bool {
        (ptr as usize) % CACHE_LINE_SIZE == 0
    }

    /// Incrementally lays out fields with natural alignment, finishing with
    /// a cache-line-aligned total size.
    #[derive(Debug, Clone, Copy)]
    pub struct LayoutOptimizer {
        /// Next free offset.
        pub offset: usize,
        /// Total size computed so far.
        pub total_size: usize,
    }

    impl LayoutOptimizer {
        /// Start a new layout at offset 0.
        #[allow(dead_code)]
        pub fn new() -> Self {
            Self {
                offset: 0,
                total_size: 0,
            }
        }

        /// Reserve `size` bytes aligned to `align`, returning the offset.
        #[allow(dead_code)]
        pub fn add_field(&mut self, size: usize, align: usize) -> usize {
            self.offset = (self.offset + align - 1) & !(align - 1);
            let field_offset = self.offset;
            self.offset += size;
            self.total_size = self.offset;
            field_offset
        }

        /// Pad the total size up to a cache line and return it.
        #[allow(dead_code)]
        pub fn finalize(&mut self) -> usize {
            self.total_size = cache_aligned_size(self.total_size);
            self.total_size
        }
    }

    impl Default for LayoutOptimizer {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_size_validation() {
        assert!(validate_segment_size(SHM_MIN_SIZE).is_ok());
        assert!(validate_segment_size(8192).is_ok());
        assert!(validate_segment_size(1024 * 1024).is_ok());

        assert!(validate_segment_size(1024).is_err());
        assert!(validate_segment_size(4097).is_err());
        assert!(validate_segment_size(2 * 1024 * 1024 * 1024).is_err());
    }

    #[test]
    fn header_creation() {
        let header = SegmentHeader::new(SHM_MIN_SIZE, 12345);
        assert_eq!(header.magic, DLB_SHM_MAGIC);
        assert_eq!(header.size, SHM_MIN_SIZE as u64);
        assert_eq!(header.writer_pid.load(Ordering::Relaxed), 12345);
        assert_eq!(header.reader_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn header_validation() {
        let header = SegmentHeader::new(SHM_MIN_SIZE, 12345);
        assert!(header.validate().is_ok());

        let mut invalid_header = header;
        invalid_header.magic = 0;
        assert!(invalid_header.validate().is_err());
    }
}
