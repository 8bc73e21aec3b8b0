//! Lifecycle management and orphan cleanup.

use crate::error::ShmResult;
use crate::platform::is_process_alive;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Operations a process-wide lifecycle manager exposes.
pub trait ShmLifecycleManager {
    /// One-time setup performed by the first process to touch the
    /// subsystem (e.g. installing an `atexit` cleanup hook).
    fn initialize_shm_subsystem() -> ShmResult<()>;

    /// Register an additional handler to run during cleanup.
    fn register_cleanup_handler(&self, handler: Box<dyn Fn() + Send>);

    /// Remove segments whose writer and all readers have died, respecting
    /// the configured grace period.
    fn periodic_cleanup(&self) -> ShmResult<usize>;

    /// Unconditionally remove every tracked segment.
    fn emergency_cleanup(&self) -> ShmResult<()>;
}

/// Tracks every segment this process has created or attached to, and
/// reclaims ones whose owning processes have all exited.
pub struct SegmentCleanup {
    grace_period: Duration,
    tracked_segments: HashMap<String, SegmentMetadata>,
}

/// Everything needed to decide whether a segment is still live.
#[derive(Debug, Clone)]
pub struct SegmentMetadata {
    /// Segment name.
    pub name: String,
    /// pid of the creating (writer) process.
    pub writer_pid: u32,
    /// Most recent access time observed by this process.
    pub last_access: SystemTime,
    /// pids of processes known to be attached as readers.
    pub reader_pids: Vec<u32>,
    /// Creation time.
    pub created_at: SystemTime,
}

impl SegmentCleanup {
    /// New coordinator with the given orphan grace period.
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            tracked_segments: HashMap::new(),
        }
    }

    /// Start tracking a segment.
    pub fn register_segment(&mut self, metadata: SegmentMetadata) {
        self.tracked_segments
            .insert(metadata.name.clone(), metadata);
    }

    /// Stop tracking a segment (its files are removed by the caller).
    pub fn unregister_segment(&mut self, name: &str) {
        self.tracked_segments.remove(name);
    }

    /// Remove every tracked segment whose writer and readers have all died
    /// and whose grace period has elapsed.
    pub fn cleanup_orphaned_segments(&mut self) -> ShmResult<usize> {
        let mut cleaned_count = 0;
        let mut to_remove = Vec::new();

        for (name, metadata) in &self.tracked_segments {
            if self.is_orphaned(metadata)? {
                if let Ok(elapsed) = metadata.last_access.elapsed() {
                    if elapsed > self.grace_period {
                        tracing::info!(segment = %name, "cleaning up orphaned segment");
                        if self.cleanup_segment(name).is_ok() {
                            to_remove.push(name.clone());
                            cleaned_count += 1;
                        }
                    }
                }
            }
        }

        for name in to_remove {
            self.tracked_segments.remove(&name);
        }

        Ok(cleaned_count)
    }

    fn is_orphaned(&self, metadata: &SegmentMetadata) -> ShmResult<bool> {
        if is_process_alive(metadata.writer_pid) {
            return Ok(false);
        }
        for &reader_pid in &metadata.reader_pids {
            if is_process_alive(reader_pid) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn cleanup_segment(&self, name: &str) -> ShmResult<()> {
        let shm_path = format!("/dev/shm/{name}");
        if std::path::Path::new(&shm_path).exists() {
            std::fs::remove_file(&shm_path)?;
        }
        let meta_path = format!("/dev/shm/{name}.meta");
        if std::path::Path::new(&meta_path).exists() {
            std::fs::remove_file(&meta_path)?;
        }
        Ok(())
    }

    /// Record that `name` was accessed just now.
    pub fn update_access_time(&mut self, name: &str) {
        if let Some(metadata) = self.tracked_segments.get_mut(name) {
            metadata.last_access = SystemTime::now();
        }
    }

    /// Record that `reader_pid` attached to `name`.
    pub fn add_reader(&mut self, name: &str, reader_pid: u32) {
        if let Some(metadata) = self.tracked_segments.get_mut(name) {
            if !metadata.reader_pids.contains(&reader_pid) {
                metadata.reader_pids.push(reader_pid);
            }
        }
    }

    /// Record that `reader_pid` detached from `name`.
    pub fn remove_reader(&mut self, name: &str, reader_pid: u32) {
        if let Some(metadata) = self.tracked_segments.get_mut(name) {
            metadata.reader_pids.retain(|&pid| pid != reader_pid);
        }
    }
}

impl Default for SegmentCleanup {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

static GLOBAL_CLEANUP: std::sync::LazyLock<std::sync::Mutex<SegmentCleanup>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(SegmentCleanup::default()));

/// Process-wide cleanup coordinator, shared by every reader/writer handle in
/// this process.
pub fn get_global_cleanup() -> std::sync::MutexGuard<'static, SegmentCleanup> {
    GLOBAL_CLEANUP.lock().unwrap()
}
