//! Process-shared synchronisation primitives built on the Linux futex
//! syscall, for placing inside a mapped segment where `std::sync` and
//! `parking_lot` (both in-process only) cannot reach.
//!
//! These back the segment mutex ("lock/unlock: a mutually exclusive
//! section" over the shared header) and `dlb_barrier`'s per-barrier
//! rw-lock and barrier primitive. Every type here is `#[repr(C)]` plain
//! atomics so it can be embedded directly in a `#[repr(C)]` shared struct.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[cfg(target_os = "linux")]
fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(std::ptr::null(), |t| t as *const libc::timespec);

    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
            std::ptr::null::<u32>(),
            0,
        )
    };

    // EAGAIN means the word already changed; ETIMEDOUT means the deadline
    // passed. Both are routine, not errors the caller needs to see.
    rc == 0 || rc == -1 && (std::io::Error::last_os_error().raw_os_error() == Some(libc::ETIMEDOUT))
}

#[cfg(target_os = "linux")]
fn futex_wake(word: &AtomicU32, n: i32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE,
            n,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0,
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn futex_wait(_word: &AtomicU32, _expected: u32, _timeout: Option<Duration>) -> bool {
    std::thread::yield_now();
    true
}

#[cfg(not(target_os = "linux"))]
fn futex_wake(_word: &AtomicU32, _n: i32) {}

/// A process-shared mutual-exclusion lock over a single word, suitable for
/// placement inside a mapped segment as its "segment mutex".
///
/// Classic two-state-plus-contended futex mutex: 0 unlocked, 1 locked
/// uncontended, 2 locked with waiters.
#[repr(C)]
pub struct RawMutex {
    state: AtomicU32,
}

impl RawMutex {
    /// A new, unlocked mutex.
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    /// Block until the lock is acquired.
    pub fn lock(&self) {
        if self
            .state
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }
        loop {
            let prev = self.state.swap(2, Ordering::Acquire);
            if prev == 0 {
                return;
            }
            futex_wait(&self.state, 2, None);
        }
    }

    /// Release the lock, waking one waiter if any were contending.
    pub fn unlock(&self) {
        if self.state.swap(0, Ordering::Release) == 2 {
            futex_wake(&self.state, 1);
        }
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

const WRITER_BIT: u32 = 1 << 31;

/// A process-shared reader/writer lock with a timed write-lock acquisition,
/// matching `pthread_rwlock_timedwrlock`'s role in the barrier registry's
/// lock hierarchy (segment mutex, then per-barrier rw-lock).
#[repr(C)]
pub struct RawRwLock {
    /// High bit set while a writer holds the lock; otherwise the low 31
    /// bits count active readers.
    state: AtomicU32,
}

/// Returned when a timed write-lock acquisition exceeds its deadline. The
/// barrier registry treats this as fatal: a peer process is presumed dead
/// while holding the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeout;

impl RawRwLock {
    /// A new, unlocked rw-lock.
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    /// Block until a read lock is acquired. Multiple readers may hold the
    /// lock simultaneously; a pending or active writer excludes all of them.
    pub fn read_lock(&self) {
        loop {
            let cur = self.state.load(Ordering::Acquire);
            if cur & WRITER_BIT != 0 {
                futex_wait(&self.state, cur, None);
                continue;
            }
            if self
                .state
                .compare_exchange_weak(cur, cur + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Release a previously acquired read lock.
    pub fn read_unlock(&self) {
        let prev = self.state.fetch_sub(1, Ordering::Release);
        if prev == 1 {
            futex_wake(&self.state, i32::MAX);
        }
    }

    /// Attempt to acquire the write lock, giving up after `timeout` elapses.
    pub fn write_lock_timeout(&self, timeout: Duration) -> Result<(), LockTimeout> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self
                .state
                .compare_exchange(0, WRITER_BIT, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(());
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return Err(LockTimeout);
            }
            let cur = self.state.load(Ordering::Acquire);
            futex_wait(&self.state, cur, Some(deadline - now));
        }
    }

    /// Release the write lock, waking every waiter (readers and writers
    /// race to re-acquire).
    pub fn write_unlock(&self) {
        self.state.store(0, Ordering::Release);
        futex_wake(&self.state, i32::MAX);
    }
}

impl Default for RawRwLock {
    fn default() -> Self {
        Self::new()
    }
}

/// A process-shared, sense-reversing counting barrier, standing in for
/// `pthread_barrier_t` with `PTHREAD_PROCESS_SHARED`. The participant count
/// may be changed between rendezvous points by a caller holding the
/// enclosing [`RawRwLock`]'s write lock; no caller may be blocked in
/// [`RawBarrier::wait`] while that happens.
#[repr(C)]
pub struct RawBarrier {
    participants: AtomicU32,
    arrived: AtomicU32,
    sense: AtomicU32,
}

impl RawBarrier {
    /// A new barrier for `participants` callers.
    pub fn new(participants: u32) -> Self {
        Self {
            participants: AtomicU32::new(participants),
            arrived: AtomicU32::new(0),
            sense: AtomicU32::new(0),
        }
    }

    /// Change the participant count. Only safe when no caller is currently
    /// blocked in [`RawBarrier::wait`].
    pub fn set_participants(&self, participants: u32) {
        self.participants.store(participants, Ordering::Release);
    }

    /// Current participant count.
    pub fn participants(&self) -> u32 {
        self.participants.load(Ordering::Acquire)
    }

    /// Block until every participant has called `wait`. Returns `true` for
    /// the caller that happened to be last to arrive.
    pub fn wait(&self) -> bool {
        let sense = self.sense.load(Ordering::Acquire);
        let target = sense ^ 1;

        let arrived = self.arrived.fetch_add(1, Ordering::AcqRel) + 1;
        if arrived == self.participants.load(Ordering::Acquire) {
            self.arrived.store(0, Ordering::Release);
            self.sense.store(target, Ordering::Release);
            futex_wake(&self.sense, i32::MAX);
            true
        } else {
            loop {
                let cur = self.sense.load(Ordering::Acquire);
                if cur == target {
                    return false;
                }
                futex_wait(&self.sense, cur, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn mutex_is_exclusive_across_threads() {
        let mutex = Arc::new(RawMutex::new());
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = vec![];

        for _ in 0..8 {
            let mutex = Arc::clone(&mutex);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    mutex.lock();
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                    mutex.unlock();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }

    #[test]
    fn rwlock_allows_concurrent_readers() {
        let lock = RawRwLock::new();
        lock.read_lock();
        lock.read_lock();
        assert_eq!(lock.state.load(Ordering::Relaxed), 2);
        lock.read_unlock();
        lock.read_unlock();
        assert_eq!(lock.state.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn rwlock_write_lock_times_out_when_held() {
        let lock = RawRwLock::new();
        lock.read_lock();
        let result = lock.write_lock_timeout(Duration::from_millis(50));
        assert_eq!(result, Err(LockTimeout));
        lock.read_unlock();
    }

    #[test]
    fn rwlock_write_lock_succeeds_when_free() {
        let lock = RawRwLock::new();
        assert!(lock.write_lock_timeout(Duration::from_millis(50)).is_ok());
        lock.write_unlock();
    }

    #[test]
    fn barrier_releases_all_participants() {
        let barrier = Arc::new(RawBarrier::new(4));
        let last_count = Arc::new(AtomicU32::new(0));
        let mut handles = vec![];

        for _ in 0..4 {
            let barrier = Arc::clone(&barrier);
            let last_count = Arc::clone(&last_count);
            handles.push(thread::spawn(move || {
                if barrier.wait() {
                    last_count.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(last_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn barrier_can_be_reused_across_generations() {
        let barrier = Arc::new(RawBarrier::new(2));
        for _ in 0..3 {
            let barrier = Arc::clone(&barrier);
            let t = thread::spawn(move || {
                barrier.wait();
            });
            barrier.wait();
            t.join().unwrap();
        }
    }
}
