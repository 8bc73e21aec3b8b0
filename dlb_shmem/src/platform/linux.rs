//! Linux-specific shared memory operations.

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use nix::unistd::getpid;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;

/// Mapping options applied when a writer first creates a segment.
pub struct LinuxMemoryConfig {
    /// Populate (fault in and lock) pages at map time for RT-predictable
    /// first access.
    pub locked: bool,
}

impl Default for LinuxMemoryConfig {
    fn default() -> Self {
        Self { locked: true }
    }
}

/// Create (or truncate-and-open) the backing file for a segment and map it.
pub fn create_segment_mmap(
    path: &str,
    size: usize,
    config: &LinuxMemoryConfig,
) -> Result<MmapMut, ShmError> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .mode(0o600)
        .open(path)?;

    file.set_len(size as u64)?;

    let mut mmap_options = MmapOptions::new();
    if config.locked {
        mmap_options.populate();
    }

    let mmap = unsafe { mmap_options.map_mut(&file)? };
    Ok(mmap)
}

/// Map an already-created segment's backing file.
pub fn attach_segment_mmap(path: &str) -> ShmResult<MmapMut> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// `true` if `pid` still exists, probed with a null signal.
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::Error::ESRCH) => false,
        Err(nix::Error::EPERM) => true,
        Err(_) => false,
    }
}

/// Current process id.
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}
