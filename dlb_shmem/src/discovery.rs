//! Segment discovery by scanning `/dev/shm`.

use crate::error::{ShmError, ShmResult};
use crate::platform::is_process_alive;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// Segment naming convention: `dlb_{name}_{writer_pid}` plus a sidecar
/// `dlb_{name}.meta` JSON file, both under `/dev/shm`.
const SEGMENT_PREFIX: &str = "dlb_";

/// Enumerates and caches segments visible in `/dev/shm`.
pub struct SegmentDiscovery {
    known_segments: HashMap<String, SegmentInfo>,
}

/// Metadata written by a writer alongside its segment, so readers and
/// diagnostics can find it without attaching.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SegmentInfo {
    /// Segment name.
    pub name: String,
    /// Payload size in bytes.
    pub size: usize,
    /// pid of the creating process.
    pub writer_pid: u32,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last access time, best-effort.
    pub last_accessed: SystemTime,
    /// Reader count at time of last refresh.
    pub reader_count: u32,
}

impl SegmentDiscovery {
    /// New discovery service with an empty cache.
    pub fn new() -> Self {
        Self {
            known_segments: HashMap::new(),
        }
    }

    /// List every segment currently present under `/dev/shm`.
    pub fn list_segments(&self) -> ShmResult<Vec<SegmentInfo>> {
        let mut segments = Vec::new();

        let shm_dir = std::path::Path::new("/dev/shm");
        if !shm_dir.exists() {
            return Ok(segments);
        }

        let entries = std::fs::read_dir(shm_dir)?;

        for entry in entries.flatten() {
            if let Ok(file_name) = entry.file_name().into_string() {
                if file_name.starts_with(SEGMENT_PREFIX) && !file_name.ends_with(".meta") {
                    if let Ok(segment_info) = self.parse_segment_info(&file_name) {
                        segments.push(segment_info);
                    }
                }
            }
        }

        segments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(segments)
    }

    /// Find a segment by name, checking the cache before re-scanning.
    pub fn find_segment(&self, name: &str) -> ShmResult<Option<SegmentInfo>> {
        if let Some(info) = self.known_segments.get(name) {
            if is_process_alive(info.writer_pid) {
                return Ok(Some(info.clone()));
            }
        }

        let segments = self.list_segments()?;
        Ok(segments.into_iter().find(|s| s.name == name))
    }

    /// Remove segments whose writer has been dead for over a minute.
    pub fn cleanup_orphaned_segments(&mut self) -> ShmResult<usize> {
        let segments = self.list_segments()?;
        let mut cleaned_count = 0;

        for segment in segments {
            if self.is_segment_orphaned(&segment)? && self.cleanup_segment(&segment.name).is_ok()
            {
                cleaned_count += 1;
                self.known_segments.remove(&segment.name);
            }
        }

        Ok(cleaned_count)
    }

    /// Refresh the cached entry for a segment.
    pub fn update_segment_cache(&mut self, info: SegmentInfo) {
        self.known_segments.insert(info.name.clone(), info);
    }

    fn parse_segment_info(&self, filename: &str) -> ShmResult<SegmentInfo> {
        let parts: Vec<&str> = filename.split('_').collect();
        if parts.len() < 3 || parts[0] != "dlb" {
            return Err(ShmError::NotFound {
                name: "invalid filename format".to_string(),
            });
        }

        let pid: u32 = parts[parts.len() - 1]
            .parse()
            .map_err(|_| ShmError::NotFound {
                name: "invalid pid in filename".to_string(),
            })?;
        let name = parts[1..parts.len() - 1].join("_");

        let meta_path = format!("/dev/shm/{SEGMENT_PREFIX}{name}.meta");
        if let Ok(meta_content) = std::fs::read_to_string(&meta_path) {
            if let Ok(mut info) = serde_json::from_str::<SegmentInfo>(&meta_content) {
                if let Ok(reader_count) = self.get_current_reader_count(filename) {
                    info.reader_count = reader_count;
                }
                return Ok(info);
            }
        }

        let segment_path = format!("/dev/shm/{filename}");
        let file_meta = std::fs::metadata(&segment_path)?;
        let created_at = file_meta
            .created()
            .or_else(|_| file_meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        Ok(SegmentInfo {
            name,
            size: file_meta.len() as usize,
            writer_pid: pid,
            created_at,
            last_accessed: created_at,
            reader_count: 0,
        })
    }

    fn get_current_reader_count(&self, filename: &str) -> ShmResult<u32> {
        use crate::platform::attach_segment_mmap;
        use crate::segment::SegmentHeader;

        let segment_path = format!("/dev/shm/{filename}");
        let mmap = attach_segment_mmap(&segment_path)?;
        let header = unsafe { &*(mmap.as_ptr() as *const SegmentHeader) };
        header.validate()?;
        Ok(header.get_reader_count())
    }

    fn is_segment_orphaned(&self, info: &SegmentInfo) -> ShmResult<bool> {
        if is_process_alive(info.writer_pid) {
            return Ok(false);
        }
        match info.created_at.elapsed() {
            Ok(elapsed) => Ok(elapsed.as_secs() > 60),
            Err(_) => Ok(true),
        }
    }

    fn cleanup_segment(&self, name: &str) -> ShmResult<()> {
        let shm_dir = std::path::Path::new("/dev/shm");
        if !shm_dir.exists() {
            return Ok(());
        }

        let entries = std::fs::read_dir(shm_dir)?;
        for entry in entries.flatten() {
            if let Ok(file_name) = entry.file_name().into_string() {
                if file_name.starts_with(&format!("{SEGMENT_PREFIX}{name}_"))
                    || file_name == format!("{SEGMENT_PREFIX}{name}.meta")
                {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
        Ok(())
    }

    /// Summary counts over everything currently visible in `/dev/shm`.
    pub fn get_statistics(&self) -> DiscoveryStats {
        let segments = self.list_segments().unwrap_or_default();
        let total_segments = segments.len();
        let active_writers = segments
            .iter()
            .filter(|s| is_process_alive(s.writer_pid))
            .count();
        let total_readers = segments.iter().map(|s| s.reader_count).sum();

        DiscoveryStats {
            total_segments,
            active_writers,
            total_readers,
            orphaned_segments: total_segments - active_writers,
        }
    }
}

/// Aggregate counts returned by [`SegmentDiscovery::get_statistics`].
#[derive(Debug, Clone)]
pub struct DiscoveryStats {
    /// Segments found under `/dev/shm`.
    pub total_segments: usize,
    /// Segments whose writer process is still alive.
    pub active_writers: usize,
    /// Sum of reader counts across all segments.
    pub total_readers: u32,
    /// Segments whose writer is dead (candidates for cleanup).
    pub orphaned_segments: usize,
}

impl Default for SegmentDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SegmentReader;
    use crate::writer::SegmentWriter;
    use dlb_common::shm_consts::SHM_MIN_SIZE;

    #[test]
    fn discovery_without_segments_does_not_error() {
        let discovery = SegmentDiscovery::new();
        let stats = discovery.get_statistics();
        assert_eq!(stats.total_segments, stats.active_writers + stats.orphaned_segments);
    }

    #[test]
    fn finds_segment_created_by_writer() {
        let test_name = format!("discovery_test_{}", std::process::id());
        let _writer = SegmentWriter::create(&test_name, SHM_MIN_SIZE).unwrap();

        let discovery = SegmentDiscovery::new();
        let found = discovery.find_segment(&test_name).unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().name, test_name);
    }

    #[test]
    fn statistics_reflect_attached_reader() {
        let test_name = format!("stats_test_{}", std::process::id());
        let _writer = SegmentWriter::create(&test_name, SHM_MIN_SIZE).unwrap();
        let _reader = SegmentReader::attach(&test_name).unwrap();

        let discovery = SegmentDiscovery::new();
        let stats = discovery.get_statistics();
        assert!(stats.total_segments > 0);
        assert!(stats.active_writers > 0);
    }
}
