//! Single-writer segment creation and in-place update.

use crate::error::{ShmError, ShmResult};
use crate::lifecycle::{get_global_cleanup, SegmentMetadata};
use crate::platform::{create_segment_mmap, get_current_pid, LinuxMemoryConfig};
use crate::segment::{validate_segment_size, SegmentHeader, SharedMemorySegment};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::sync::atomic::{fence, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Exclusive handle that owns a segment for its whole lifetime. The backing
/// files are removed when this handle is dropped.
pub struct SegmentWriter {
    segment: SharedMemorySegment,
    current_version: u64,
    writer_pid: u32,
}

impl SegmentWriter {
    /// Create a new segment, failing if one by this name already exists.
    pub fn create(name: &str, size: usize) -> ShmResult<Self> {
        validate_segment_size(size)?;

        let writer_pid = get_current_pid();
        let segment_path = format!("/dev/shm/dlb_{name}_{writer_pid}");

        if std::path::Path::new(&segment_path).exists() {
            return Err(ShmError::AlreadyExists {
                name: name.to_string(),
            });
        }

        let header_size = std::mem::size_of::<SegmentHeader>();
        let total_size = size + header_size;

        let config = LinuxMemoryConfig::default();
        let mut mmap = create_segment_mmap(&segment_path, total_size, &config)?;

        {
            let header = unsafe { &mut *(mmap.as_mut_ptr() as *mut SegmentHeader) };
            *header = SegmentHeader::new(size, writer_pid);
        }
        fence(Ordering::Release);

        let segment = SharedMemorySegment::new(name.to_string(), size, mmap)?;

        Self::create_metadata_file(name, size, writer_pid)?;

        get_global_cleanup().register_segment(SegmentMetadata {
            name: name.to_string(),
            writer_pid,
            last_access: SystemTime::now(),
            reader_pids: vec![],
            created_at: SystemTime::now(),
        });

        Ok(Self {
            segment,
            current_version: 0,
            writer_pid,
        })
    }

    /// Overwrite the payload from offset zero.
    pub fn write(&mut self, data: &[u8]) -> ShmResult<()> {
        self.write_at(0, data)
    }

    /// Overwrite `data.len()` bytes starting at `offset`, bumping the
    /// version counter odd-then-even around the copy.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> ShmResult<()> {
        if offset + data.len() > self.segment.data_size {
            return Err(ShmError::InvalidSize {
                size: offset + data.len(),
            });
        }

        let data_ptr = unsafe { self.segment.data_ptr_mut().add(offset) };

        self.current_version = self.segment.header().version_counter().begin_write();

        fence(Ordering::Release);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), data_ptr, data.len());
        }
        fence(Ordering::Release);

        self.current_version = self.segment.header().version_counter().end_write();

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;
        self.segment.header().last_write_ts.store(now, Ordering::Release);

        get_global_cleanup().update_access_time(&self.segment.name);
        Ok(())
    }

    /// Force a full memory barrier so all prior writes are visible to other
    /// processes before returning.
    pub fn flush(&mut self) -> ShmResult<()> {
        fence(Ordering::SeqCst);
        Ok(())
    }

    /// Version counter after the most recent write.
    pub fn current_version(&self) -> u64 {
        self.current_version
    }

    /// pid of this writer.
    pub fn writer_pid(&self) -> u32 {
        self.writer_pid
    }

    /// Segment name.
    pub fn name(&self) -> &str {
        &self.segment.name
    }

    /// Payload size in bytes.
    pub fn data_size(&self) -> usize {
        self.segment.data_size
    }

    fn create_metadata_file(name: &str, size: usize, writer_pid: u32) -> ShmResult<()> {
        use crate::discovery::SegmentInfo;

        let metadata = SegmentInfo {
            name: name.to_string(),
            size,
            writer_pid,
            created_at: SystemTime::now(),
            last_accessed: SystemTime::now(),
            reader_count: 0,
        };

        let metadata_path = format!("/dev/shm/dlb_{name}.meta");
        let metadata_json = serde_json::to_string_pretty(&metadata)?;

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .mode(0o600)
            .open(&metadata_path)?;

        std::io::Write::write_all(&mut file, metadata_json.as_bytes())?;
        Ok(())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        let segment_path = format!("/dev/shm/dlb_{}_{}", self.segment.name, self.writer_pid);
        let metadata_path = format!("/dev/shm/dlb_{}.meta", self.segment.name);
        let _ = std::fs::remove_file(segment_path);
        let _ = std::fs::remove_file(metadata_path);
        get_global_cleanup().unregister_segment(&self.segment.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlb_common::shm_consts::SHM_MIN_SIZE;

    #[test]
    fn creates_and_sizes_segment() {
        let writer = SegmentWriter::create("write_create_test", SHM_MIN_SIZE);
        assert!(writer.is_ok());

        let writer = writer.unwrap();
        assert_eq!(writer.data_size(), SHM_MIN_SIZE);
        assert_eq!(writer.current_version(), 0);
        assert!(writer.writer_pid() > 0);
    }

    #[test]
    fn second_writer_with_same_name_fails() {
        let _writer1 = SegmentWriter::create("exclusive_test", SHM_MIN_SIZE).unwrap();
        let writer2 = SegmentWriter::create("exclusive_test", SHM_MIN_SIZE);
        assert!(matches!(writer2, Err(ShmError::AlreadyExists { .. })));
    }

    #[test]
    fn rejects_oversized_write() {
        let mut writer = SegmentWriter::create("write_test", SHM_MIN_SIZE).unwrap();

        let data = b"Hello, World!";
        assert!(writer.write(data).is_ok());
        assert!(writer.write_at(100, data).is_ok());

        let large_data = vec![0u8; 5000];
        assert!(matches!(
            writer.write(&large_data),
            Err(ShmError::InvalidSize { .. })
        ));
    }

    #[test]
    fn version_advances_by_two_per_write() {
        let mut writer = SegmentWriter::create("version_test", SHM_MIN_SIZE).unwrap();

        let initial_version = writer.current_version();
        writer.write(b"test data").unwrap();

        assert!(writer.current_version() > initial_version);
        assert_eq!(writer.current_version() % 2, 0);
        assert_eq!(writer.current_version(), 2);
    }
}
