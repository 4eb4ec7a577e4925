//! Access Lock Module
//!
//! Reentrant multi-reader/single-writer lock with per-thread bookkeeping.
//!
//! ## Rules
//! - A thread's first read (or write) takes the real shared (or exclusive) lock;
//!   nested acquisitions of the same kind only bump its counter
//! - Read requested while holding a write: counted as another write
//!   (the writer already excludes every reader)
//! - Write requested while holding only reads: a promotion attempt, always
//!   rejected. The read counter is still bumped, so the caller's matching
//!   `release` stays balanced
//! - `release` undoes one acquisition; the real lock is released when the
//!   thread's counter for that kind reaches zero, and the thread's entry is
//!   dropped once both counters are zero
//!
//! Callers (index and table code above the storage layer) hold this lock
//! around any sequence of block/object operations that must be atomic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use crossbeam::utils::CachePadded;
use parking_lot::lock_api::RawRwLock as RawRwLockApi;
use parking_lot::{Mutex, RawRwLock};
use tracing::{debug, trace};

use crate::error::{Result, StrataError};

/// Kind of access requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

/// Acquisition counts of one thread
#[derive(Debug, Default, Clone, Copy)]
struct ThreadLockState {
    read_locks: usize,
    write_locks: usize,
}

impl ThreadLockState {
    fn is_idle(&self) -> bool {
        self.read_locks == 0 && self.write_locks == 0
    }
}

/// What `acquire` must do to the real lock
enum Acquisition {
    /// Counter bumped already; nothing else to do
    Done,
    /// First acquisition of this kind: take the real lock, then count it
    Take(LockMode),
}

/// Reentrant MRSW lock
pub struct AccessLock {
    lock: RawRwLock,
    threads: Mutex<HashMap<ThreadId, ThreadLockState>>,
    active_read_locks: CachePadded<AtomicUsize>,
    active_write_locks: CachePadded<AtomicUsize>,
}

impl AccessLock {
    pub fn new() -> Self {
        Self {
            lock: <RawRwLock as RawRwLockApi>::INIT,
            threads: Mutex::new(HashMap::new()),
            active_read_locks: CachePadded::new(AtomicUsize::new(0)),
            active_write_locks: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire the lock for the calling thread
    ///
    /// Blocks until the real lock is available. Fails with `Lock` on a
    /// promotion attempt; `release` must still be called once for it.
    pub fn acquire(&self, mode: LockMode) -> Result<()> {
        let me = thread::current().id();

        // Step 1: Decide under the state mutex (never block while holding it)
        let action = {
            let mut threads = self.threads.lock();
            match threads.get_mut(&me) {
                // Entries only exist while the thread holds something
                None => Acquisition::Take(mode),
                Some(state) => self.nested_acquisition(me, state, mode)?,
            }
        };

        match action {
            Acquisition::Done => Ok(()),
            Acquisition::Take(mode) => self.first_acquisition(me, mode),
        }
    }

    /// Count an acquisition by a thread that already holds the lock
    fn nested_acquisition(
        &self,
        me: ThreadId,
        state: &mut ThreadLockState,
        mode: LockMode,
    ) -> Result<Acquisition> {
        match mode {
            LockMode::Write if state.read_locks > 0 && state.write_locks == 0 => {
                state.read_locks += 1;
                self.active_read_locks.fetch_add(1, Ordering::SeqCst);
                debug!(thread = ?me, "rejected lock promotion");
                Err(StrataError::Lock(
                    "lock promotion from read to write is not allowed".to_string(),
                ))
            }
            // A writer already excludes all readers
            LockMode::Read if state.write_locks > 0 => {
                state.write_locks += 1;
                self.active_write_locks.fetch_add(1, Ordering::SeqCst);
                Ok(Acquisition::Done)
            }
            LockMode::Read if state.read_locks > 0 => {
                state.read_locks += 1;
                self.active_read_locks.fetch_add(1, Ordering::SeqCst);
                Ok(Acquisition::Done)
            }
            LockMode::Write if state.write_locks > 0 => {
                state.write_locks += 1;
                self.active_write_locks.fetch_add(1, Ordering::SeqCst);
                Ok(Acquisition::Done)
            }
            _ => Ok(Acquisition::Take(mode)),
        }
    }

    /// Take the real lock, then record it (state mutex not held by the caller)
    fn first_acquisition(&self, me: ThreadId, mode: LockMode) -> Result<()> {
        match mode {
            LockMode::Read => self.lock.lock_shared(),
            LockMode::Write => self.lock.lock_exclusive(),
        }

        let mut threads = self.threads.lock();
        let state = threads.entry(me).or_default();
        match mode {
            LockMode::Read => {
                state.read_locks += 1;
                self.active_read_locks.fetch_add(1, Ordering::SeqCst);
            }
            LockMode::Write => {
                state.write_locks += 1;
                self.active_write_locks.fetch_add(1, Ordering::SeqCst);
            }
        }
        trace!(thread = ?me, ?mode, "took underlying lock");
        Ok(())
    }

    /// Undo one acquisition by the calling thread
    pub fn release(&self) -> Result<()> {
        let me = thread::current().id();

        let unlock = {
            let mut threads = self.threads.lock();
            let state = match threads.get_mut(&me) {
                Some(state) if !state.is_idle() => state,
                _ => {
                    return Err(StrataError::Lock(
                        "release called with no lock held".to_string(),
                    ))
                }
            };

            let unlock = if state.read_locks > 0 {
                state.read_locks -= 1;
                self.active_read_locks.fetch_sub(1, Ordering::SeqCst);
                (state.read_locks == 0).then_some(LockMode::Read)
            } else {
                state.write_locks -= 1;
                self.active_write_locks.fetch_sub(1, Ordering::SeqCst);
                (state.write_locks == 0).then_some(LockMode::Write)
            };
            if state.is_idle() {
                threads.remove(&me);
            }
            unlock
        };

        // SAFETY: the per-thread counter for this kind just dropped to zero,
        // and it only became non-zero after this thread took the real lock
        // of the same kind in `acquire`.
        match unlock {
            Some(LockMode::Read) => unsafe { self.lock.unlock_shared() },
            Some(LockMode::Write) => unsafe { self.lock.unlock_exclusive() },
            None => {}
        }
        if let Some(mode) = unlock {
            trace!(thread = ?me, ?mode, "released underlying lock");
        }

        Ok(())
    }

    /// Acquire and return a guard that releases on drop
    pub fn guard(&self, mode: LockMode) -> Result<AccessGuard<'_>> {
        if let Err(e) = self.acquire(mode) {
            // Balance the counted-but-rejected promotion
            self.release()?;
            return Err(e);
        }
        Ok(AccessGuard { lock: self })
    }

    /// Read acquisitions currently counted, across all threads
    pub fn active_read_locks(&self) -> usize {
        self.active_read_locks.load(Ordering::SeqCst)
    }

    /// Write acquisitions currently counted, across all threads
    pub fn active_write_locks(&self) -> usize {
        self.active_write_locks.load(Ordering::SeqCst)
    }

    /// Number of threads currently holding the lock in any mode
    pub fn tracked_threads(&self) -> usize {
        self.threads.lock().len()
    }

    /// True if the calling thread holds the lock in any mode
    pub fn is_held_by_current_thread(&self) -> bool {
        let me = thread::current().id();
        self.threads
            .lock()
            .get(&me)
            .is_some_and(|state| !state.is_idle())
    }
}

impl Default for AccessLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases one acquisition when dropped
pub struct AccessGuard<'a> {
    lock: &'a AccessLock,
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release() {
            debug!(error = %e, "release on guard drop failed");
        }
    }
}
