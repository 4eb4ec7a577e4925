//! Tests for AccessLock
//!
//! These tests verify:
//! - Shared readers across threads
//! - Reentrancy and counter bookkeeping
//! - Promotion rejection and write-then-read nesting
//! - Writer exclusion

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use strata::{AccessLock, LockMode, StrataError};

// =============================================================================
// Helper Functions
// =============================================================================

fn shared_lock() -> Arc<AccessLock> {
    Arc::new(AccessLock::new())
}

// =============================================================================
// Single Thread Tests
// =============================================================================

#[test]
fn test_nested_reads() {
    let lock = AccessLock::new();

    lock.acquire(LockMode::Read).unwrap();
    lock.acquire(LockMode::Read).unwrap();
    assert_eq!(lock.active_read_locks(), 2);
    assert!(lock.is_held_by_current_thread());

    lock.release().unwrap();
    assert!(lock.is_held_by_current_thread());
    lock.release().unwrap();
    assert!(!lock.is_held_by_current_thread());
    assert_eq!(lock.active_read_locks(), 0);
}

#[test]
fn test_promotion_rejected() {
    let lock = AccessLock::new();

    lock.acquire(LockMode::Read).unwrap();
    let result = lock.acquire(LockMode::Write);
    assert!(matches!(result, Err(StrataError::Lock(_))));

    // The rejected attempt still needs its own release
    assert_eq!(lock.active_read_locks(), 2);
    lock.release().unwrap();
    lock.release().unwrap();
    assert!(!lock.is_held_by_current_thread());
}

#[test]
fn test_read_inside_write_counts_as_write() {
    let lock = AccessLock::new();

    lock.acquire(LockMode::Write).unwrap();
    lock.acquire(LockMode::Read).unwrap();
    assert_eq!(lock.active_write_locks(), 2);
    assert_eq!(lock.active_read_locks(), 0);

    lock.release().unwrap();
    assert!(lock.is_held_by_current_thread());
    lock.release().unwrap();
    assert!(!lock.is_held_by_current_thread());

    // Underlying lock is free again
    lock.acquire(LockMode::Write).unwrap();
    lock.release().unwrap();
}

#[test]
fn test_release_without_acquire() {
    let lock = AccessLock::new();
    assert!(matches!(lock.release(), Err(StrataError::Lock(_))));

    lock.acquire(LockMode::Read).unwrap();
    lock.release().unwrap();
    assert!(matches!(lock.release(), Err(StrataError::Lock(_))));
}

#[test]
fn test_guard_releases_on_drop() {
    let lock = AccessLock::new();
    {
        let _outer = lock.guard(LockMode::Write).unwrap();
        let _inner = lock.guard(LockMode::Read).unwrap();
        assert_eq!(lock.active_write_locks(), 2);
    }
    assert_eq!(lock.active_write_locks(), 0);
    assert!(!lock.is_held_by_current_thread());
}

#[test]
fn test_guard_promotion_leaves_counts_balanced() {
    let lock = AccessLock::new();
    let _read = lock.guard(LockMode::Read).unwrap();

    assert!(lock.guard(LockMode::Write).is_err());
    assert_eq!(lock.active_read_locks(), 1);
}

// =============================================================================
// Multi Thread Tests
// =============================================================================

#[test]
fn test_concurrent_readers() {
    let lock = shared_lock();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                lock.acquire(LockMode::Read).unwrap();
                // Both threads must be inside at once to pass the barrier
                barrier.wait();
                lock.release().unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(lock.active_read_locks(), 0);
}

#[test]
fn test_writer_excludes_readers() {
    let lock = shared_lock();
    let reader_entered = Arc::new(AtomicBool::new(false));

    lock.acquire(LockMode::Write).unwrap();

    let reader = {
        let lock = Arc::clone(&lock);
        let reader_entered = Arc::clone(&reader_entered);
        thread::spawn(move || {
            lock.acquire(LockMode::Read).unwrap();
            reader_entered.store(true, Ordering::SeqCst);
            lock.release().unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!reader_entered.load(Ordering::SeqCst));

    lock.release().unwrap();
    reader.join().unwrap();
    assert!(reader_entered.load(Ordering::SeqCst));
}

#[test]
fn test_nested_write_held_until_last_release() {
    let lock = shared_lock();
    let (entered_tx, entered_rx) = mpsc::channel();

    lock.acquire(LockMode::Write).unwrap();
    lock.acquire(LockMode::Read).unwrap();

    let reader = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            lock.acquire(LockMode::Read).unwrap();
            entered_tx.send(()).unwrap();
            lock.release().unwrap();
        })
    };

    // One of two releases: the other thread must still be shut out
    lock.release().unwrap();
    assert!(entered_rx.recv_timeout(Duration::from_millis(100)).is_err());

    lock.release().unwrap();
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    reader.join().unwrap();
    assert_eq!(lock.tracked_threads(), 0);
}

#[test]
fn test_writers_are_mutually_exclusive() {
    let lock = shared_lock();
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            thread::spawn(move || {
                for _ in 0..50 {
                    let _guard = lock.guard(LockMode::Write).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    // Nested read while writing
                    let _nested = lock.guard(LockMode::Read).unwrap();
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert_eq!(lock.active_write_locks(), 0);
}

#[test]
fn test_thread_state_dropped_when_idle() {
    let lock = shared_lock();

    for _ in 0..100 {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            lock.acquire(LockMode::Read).unwrap();
            lock.acquire(LockMode::Read).unwrap();
            assert_eq!(lock.tracked_threads(), 1);
            lock.release().unwrap();
            lock.release().unwrap();
        })
        .join()
        .unwrap();
    }

    assert_eq!(lock.tracked_threads(), 0);
}
