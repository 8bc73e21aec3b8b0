//! Named barrier registry: register/attach/detach/cross a barrier shared by
//! every process on the node.

use crate::directory::{BarrierDirectory, LOCK_TIMEOUT};
use crate::error::{BarrierError, BarrierResult};
use std::sync::atomic::Ordering;

/// Opaque reference to a barrier slot, returned by [`BarrierRegistry::register`]
/// and [`BarrierRegistry::find`]. Stable for the life of the process; index
/// based rather than a pointer, since the backing slot can move across
/// remappings of the shared segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierHandle(usize);

/// Node-local barrier registry, backed by one shared [`BarrierDirectory`].
pub struct BarrierRegistry {
    directory: BarrierDirectory,
}

impl BarrierRegistry {
    /// Open (creating if this is the first process on the node) the
    /// barrier directory for `key`, scaled by `size_multiplier`.
    pub fn init(key: &str, size_multiplier: u32) -> BarrierResult<Self> {
        let directory = BarrierDirectory::open(key, size_multiplier)?;
        Ok(Self { directory })
    }

    /// Register (or join) a named barrier.
    ///
    /// If `name` already has a slot, increments its participant count and
    /// re-initialises the rendezvous primitive with the new count. Otherwise
    /// claims the first free slot for a fresh, single-participant barrier.
    /// Returns [`BarrierError::NoMemory`] if the directory is full.
    pub fn register(&self, name: &str, lewi: bool) -> BarrierResult<BarrierHandle> {
        self.directory.with_segment_lock(|| {
            if let Some(idx) = self.find_index_locked(name) {
                let slot = &self.directory.slots()[idx];
                slot.lock
                    .write_lock_timeout(LOCK_TIMEOUT)
                    .map_err(|_| BarrierError::PeerHung(name.to_string()))?;
                let participants = slot.participants.fetch_add(1, Ordering::AcqRel) + 1;
                slot.rendezvous.set_participants(participants);
                slot.lock.write_unlock();
                return Ok(BarrierHandle(idx));
            }

            let free_idx = self
                .directory
                .slots()
                .iter()
                .position(|s| s.is_free())
                .ok_or(BarrierError::NoMemory)?;
            self.directory.slots()[free_idx].init(name, lewi);
            Ok(BarrierHandle(free_idx))
        })
    }

    /// Look up an existing barrier by name without registering a new one.
    pub fn find(&self, name: &str) -> Option<BarrierHandle> {
        self.directory
            .with_segment_lock(|| self.find_index_locked(name).map(BarrierHandle))
    }

    fn find_index_locked(&self, name: &str) -> Option<usize> {
        self.directory
            .slots()
            .iter()
            .position(|s| !s.is_free() && s.name() == name)
    }

    /// Join an already-registered barrier, bumping its participant count.
    /// Equivalent to [`Self::register`]'s "found" path, addressed by handle
    /// rather than by name.
    pub fn attach(&self, handle: BarrierHandle) -> BarrierResult<()> {
        let slot = self.slot(handle)?;
        self.directory.with_segment_lock(|| {
            slot.lock
                .write_lock_timeout(LOCK_TIMEOUT)
                .map_err(|_| BarrierError::PeerHung(slot.name()))?;
            let participants = slot.participants.fetch_add(1, Ordering::AcqRel) + 1;
            slot.rendezvous.set_participants(participants);
            slot.lock.write_unlock();
            Ok(())
        })
    }

    /// Leave a barrier, decrementing its participant count. Destroys the
    /// slot (zeroing it) when the last participant detaches, returning the
    /// remaining participant count.
    pub fn detach(&self, handle: BarrierHandle) -> BarrierResult<u32> {
        let slot = self.slot(handle)?;
        self.directory.with_segment_lock(|| {
            slot.lock
                .write_lock_timeout(LOCK_TIMEOUT)
                .map_err(|_| BarrierError::PeerHung(slot.name()))?;

            let remaining = slot.participants.fetch_sub(1, Ordering::AcqRel) - 1;
            if remaining == 0 {
                slot.clear();
                slot.lock.write_unlock();
            } else {
                slot.rendezvous.set_participants(remaining);
                slot.lock.write_unlock();
            }
            Ok(remaining)
        })
    }

    /// Cross the barrier identified by `handle`. Blocks until every
    /// currently-registered participant has called this, then returns.
    pub fn barrier(&self, handle: BarrierHandle) -> BarrierResult<()> {
        let slot = self.slot(handle)?;
        slot.lock.read_lock();

        let arrived = slot.arrive_count.fetch_add(1, Ordering::AcqRel) + 1;
        let last_in = arrived as u32 == slot.participants.load(Ordering::Acquire);
        if last_in {
            tracing::trace!(barrier = %slot.name(), "last participant into blocking call");
        }

        let was_last_out = slot.rendezvous.wait();

        let remaining = slot.arrive_count.fetch_sub(1, Ordering::AcqRel) - 1;
        if was_last_out {
            slot.ntimes.fetch_add(1, Ordering::AcqRel);
            tracing::trace!(
                barrier = %slot.name(),
                remaining,
                "last participant out of blocking call"
            );
        }

        slot.lock.read_unlock();
        Ok(())
    }

    /// Number of completed crossings of `handle`'s barrier.
    pub fn ntimes(&self, handle: BarrierHandle) -> BarrierResult<u64> {
        Ok(self.slot(handle)?.ntimes.load(Ordering::Acquire))
    }

    /// Current participant count of `handle`'s barrier.
    pub fn participants(&self, handle: BarrierHandle) -> BarrierResult<u32> {
        Ok(self.slot(handle)?.participants.load(Ordering::Acquire))
    }

    /// Log every registered barrier's name, participant count and crossing
    /// count at info level.
    pub fn print_info(&self) {
        for slot in self.directory.slots().iter().filter(|s| !s.is_free()) {
            tracing::info!(
                barrier = %slot.name(),
                participants = slot.participants.load(Ordering::Acquire),
                ntimes = slot.ntimes.load(Ordering::Acquire),
                "barrier registry entry"
            );
        }
    }

    /// Release this process's view of the directory. The directory itself
    /// is destroyed by its backing file going away once no process still
    /// has it mapped (see [`crate::directory::BarrierDirectory`]); this call
    /// is a no-op hook kept for parity with the shared-segment host's
    /// `finalize(check_empty)` contract.
    pub fn finalize(self) -> BarrierResult<()> {
        Ok(())
    }

    fn slot(&self, handle: BarrierHandle) -> BarrierResult<&crate::slot::BarrierSlot> {
        self.directory
            .slots()
            .get(handle.0)
            .filter(|s| !s.is_free())
            .ok_or_else(|| BarrierError::NoEntry(format!("handle {}", handle.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn unique_key(tag: &str) -> String {
        format!("test_{tag}_{}", std::process::id())
    }

    #[test]
    fn register_creates_a_single_participant_barrier() {
        let registry = BarrierRegistry::init(&unique_key("register"), 1).unwrap();
        let handle = registry.register("phase_a", false).unwrap();
        assert_eq!(registry.participants(handle).unwrap(), 1);
    }

    #[test]
    fn registering_the_same_name_twice_bumps_participants() {
        let registry = BarrierRegistry::init(&unique_key("rereg"), 1).unwrap();
        let h1 = registry.register("phase_b", false).unwrap();
        let h2 = registry.register("phase_b", false).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(registry.participants(h1).unwrap(), 2);
    }

    #[test]
    fn find_locates_a_registered_barrier() {
        let registry = BarrierRegistry::init(&unique_key("find"), 1).unwrap();
        let handle = registry.register("phase_c", false).unwrap();
        assert_eq!(registry.find("phase_c"), Some(handle));
        assert_eq!(registry.find("nonexistent"), None);
    }

    #[test]
    fn detach_to_zero_frees_the_slot() {
        let registry = BarrierRegistry::init(&unique_key("detach"), 1).unwrap();
        let handle = registry.register("phase_d", false).unwrap();
        let remaining = registry.detach(handle).unwrap();
        assert_eq!(remaining, 0);
        assert_eq!(registry.find("phase_d"), None);
    }

    #[test]
    fn detach_above_zero_keeps_the_slot() {
        let registry = BarrierRegistry::init(&unique_key("detach_partial"), 1).unwrap();
        let handle = registry.register("phase_e", false).unwrap();
        registry.register("phase_e", false).unwrap();
        let remaining = registry.detach(handle).unwrap();
        assert_eq!(remaining, 1);
        assert!(registry.find("phase_e").is_some());
    }

    #[test]
    fn two_participants_both_cross_the_barrier() {
        let registry = Arc::new(BarrierRegistry::init(&unique_key("cross"), 1).unwrap());
        let h1 = registry.register("rendezvous", false).unwrap();
        registry.register("rendezvous", false).unwrap();
        assert_eq!(registry.participants(h1).unwrap(), 2);

        let r1 = Arc::clone(&registry);
        let t = thread::spawn(move || r1.barrier(h1).unwrap());
        registry.barrier(h1).unwrap();
        t.join().unwrap();

        assert_eq!(registry.ntimes(h1).unwrap(), 1);
    }

    #[test]
    fn register_fails_when_directory_is_full() {
        let registry = BarrierRegistry::init(&unique_key("full"), 1).unwrap();
        let capacity = registry.directory.capacity();
        for i in 0..capacity {
            registry.register(&format!("b{i}"), false).unwrap();
        }
        let overflow = registry.register("one_too_many", false);
        assert!(matches!(overflow, Err(BarrierError::NoMemory)));
    }

    #[test]
    fn detaching_an_unregistered_handle_is_no_entry() {
        let registry = BarrierRegistry::init(&unique_key("badhandle"), 1).unwrap();
        let bogus = BarrierHandle(0);
        assert!(matches!(
            registry.detach(bogus),
            Err(BarrierError::NoEntry(_))
        ));
    }
}
