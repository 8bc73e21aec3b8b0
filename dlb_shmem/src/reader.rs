//! Lock-free reader with optimistic conflict detection.

use crate::error::{ShmError, ShmResult};
use crate::lifecycle::get_global_cleanup;
use crate::platform::{attach_segment_mmap, get_current_pid};
use crate::segment::{SegmentHeader, SharedMemorySegment};
use crate::version::VersionCounter;
use std::sync::atomic::{fence, Ordering};

/// A read-only attachment to a named segment. Safe to hold from multiple
/// threads in the same process; each holds its own copy buffer.
pub struct SegmentReader {
    segment: SharedMemorySegment,
    last_seen_version: u64,
    read_buffer: Vec<u8>,
    reader_pid: u32,
}

impl SegmentReader {
    /// Attach to an existing segment by name.
    pub fn attach(name: &str) -> ShmResult<Self> {
        let reader_pid = get_current_pid();

        let segment_path = Self::find_segment_path(name)?;
        let mmap = attach_segment_mmap(&segment_path)?;

        let header = unsafe { &*(mmap.as_ptr() as *const SegmentHeader) };
        header.validate()?;
        let data_size = header.size as usize;

        let segment = SharedMemorySegment::new(name.to_string(), data_size, mmap)?;
        segment.header().add_reader();
        get_global_cleanup().add_reader(name, reader_pid);

        let initial_version = dlb_common::atomic::load_acq_u64(&segment.header().version);

        Ok(Self {
            segment,
            last_seen_version: initial_version,
            read_buffer: Vec::with_capacity(data_size),
            reader_pid,
        })
    }

    /// Read the whole payload.
    pub fn read(&mut self) -> ShmResult<&[u8]> {
        self.read_range(0, self.segment.data_size)
    }

    /// Read a payload sub-range, retrying while the writer is mid-update.
    pub fn read_range(&mut self, offset: usize, len: usize) -> ShmResult<&[u8]> {
        if offset + len > self.segment.data_size {
            return Err(ShmError::InvalidSize { size: offset + len });
        }

        let header = self.segment.header();
        const MAX_RETRIES: u32 = 10;

        for _attempt in 0..MAX_RETRIES {
            let version_before = dlb_common::atomic::load_acq_u64(&header.version);
            if !VersionCounter::is_stable(version_before) {
                std::thread::yield_now();
                continue;
            }

            fence(Ordering::Acquire);

            if self.read_buffer.len() < len {
                self.read_buffer.resize(len, 0);
            }
            unsafe {
                let src_ptr = self.segment.data_ptr().add(offset);
                std::ptr::copy_nonoverlapping(src_ptr, self.read_buffer.as_mut_ptr(), len);
            }

            fence(Ordering::Acquire);

            let version_after = dlb_common::atomic::load_acq_u64(&header.version);
            if version_before == version_after {
                self.last_seen_version = version_after;
                get_global_cleanup().update_access_time(&self.segment.name);
                return Ok(&self.read_buffer[..len]);
            }

            std::thread::yield_now();
        }

        Err(ShmError::VersionConflict)
    }

    /// Version observed on the most recent successful read.
    pub fn version(&self) -> u64 {
        self.last_seen_version
    }

    /// `true` if the segment has a stable version newer than the last read.
    pub fn has_changed(&self) -> bool {
        let current_version = dlb_common::atomic::load_acq_u64(&self.segment.header().version);
        current_version != self.last_seen_version && VersionCounter::is_stable(current_version)
    }

    /// pid of this reader.
    pub fn reader_pid(&self) -> u32 {
        self.reader_pid
    }

    /// Segment name.
    pub fn name(&self) -> &str {
        &self.segment.name
    }

    /// Payload size in bytes.
    pub fn data_size(&self) -> usize {
        self.segment.data_size
    }

    /// Current reader count, as seen through the shared header.
    pub fn reader_count(&self) -> u32 {
        self.segment.header().get_reader_count()
    }

    fn find_segment_path(name: &str) -> ShmResult<String> {
        let shm_dir = std::path::Path::new("/dev/shm");
        if !shm_dir.exists() {
            return Err(ShmError::NotFound {
                name: name.to_string(),
            });
        }

        let entries = std::fs::read_dir(shm_dir)?;
        let pattern = format!("dlb_{name}_");
        let mut paths = Vec::new();
        for entry in entries.flatten() {
            if let Ok(file_name) = entry.file_name().into_string() {
                if file_name.starts_with(&pattern) && !file_name.ends_with(".meta") {
                    paths.push(format!("/dev/shm/{file_name}"));
                }
            }
        }

        if paths.is_empty() {
            return Err(ShmError::NotFound {
                name: name.to_string(),
            });
        }

        // Prefer the most recently modified candidate, in case a stale
        // segment from a crashed writer with the same name still lingers.
        paths.sort_by(|a, b| {
            let mtime = |p: &str| {
                std::fs::metadata(p)
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
            };
            mtime(b).cmp(&mtime(a))
        });

        Ok(paths.remove(0))
    }
}

impl Drop for SegmentReader {
    fn drop(&mut self) {
        self.segment.header().remove_reader();
        get_global_cleanup().remove_reader(&self.segment.name, self.reader_pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::SegmentWriter;
    use dlb_common::shm_consts::SHM_MIN_SIZE;

    #[test]
    fn attaches_to_existing_segment() {
        let test_name = format!("reader_test_{}", std::process::id());
        let mut writer = SegmentWriter::create(&test_name, SHM_MIN_SIZE).unwrap();
        writer.write(b"Hello, Reader!").unwrap();

        let reader = SegmentReader::attach(&test_name).unwrap();
        assert_eq!(reader.data_size(), SHM_MIN_SIZE);
        assert_eq!(reader.reader_count(), 1);
    }

    #[test]
    fn reads_back_written_data() {
        let test_name = format!("data_test_{}", std::process::id());
        let mut writer = SegmentWriter::create(&test_name, SHM_MIN_SIZE).unwrap();
        let test_data = b"Test data for reading";
        writer.write(test_data).unwrap();

        let mut reader = SegmentReader::attach(&test_name).unwrap();
        let read_data = reader.read().unwrap();
        assert_eq!(&read_data[..test_data.len()], test_data);
        assert!(reader.version() > 0);
    }

    #[test]
    fn multiple_readers_share_one_count() {
        let name = format!("multi_reader_test_{}", std::process::id());
        let mut writer = SegmentWriter::create(&name, SHM_MIN_SIZE).unwrap();
        writer.write(b"Shared data").unwrap();

        let reader1 = SegmentReader::attach(&name).unwrap();
        let reader2 = SegmentReader::attach(&name).unwrap();
        let reader3 = SegmentReader::attach(&name).unwrap();

        assert_eq!(reader1.reader_count(), 3);
        assert_eq!(reader2.reader_count(), 3);
        assert_eq!(reader3.reader_count(), 3);
    }

    #[test]
    fn detects_version_changes() {
        let test_name = format!("version_track_test_{}", std::process::id());
        let mut writer = SegmentWriter::create(&test_name, SHM_MIN_SIZE).unwrap();
        let mut reader = SegmentReader::attach(&test_name).unwrap();

        let initial_version = reader.version();
        writer.write(b"New data").unwrap();
        assert!(reader.has_changed());

        reader.read().unwrap();
        assert!(reader.version() > initial_version);
        assert!(!reader.has_changed());
    }

    #[test]
    fn reads_a_sub_range() {
        let name = format!("range_test_{}", std::process::id());
        let mut writer = SegmentWriter::create(&name, SHM_MIN_SIZE).unwrap();
        writer
            .write(b"Hello, World! This is a longer message.")
            .unwrap();

        let mut reader = SegmentReader::attach(&name).unwrap();
        let range_data = reader.read_range(7, 6).unwrap();
        assert_eq!(std::str::from_utf8(range_data).unwrap(), "World!");
    }

    #[test]
    fn attaching_to_missing_segment_fails() {
        let reader = SegmentReader::attach("nonexistent_segment");
        assert!(matches!(reader, Err(ShmError::NotFound { .. })));
    }
}
