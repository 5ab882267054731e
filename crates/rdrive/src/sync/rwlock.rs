use core::{
    hint::spin_loop,
    sync::atomic::{AtomicUsize, Ordering},
};

use lock_api::GuardSend;
use log::warn;

const WRITER: usize = 1;
const WRITER_WAITING: usize = 1 << 1;
const READER: usize = 1 << 2;
const READERS_MASK: usize = !(WRITER | WRITER_WAITING);
const MAX_READERS: usize = usize::MAX / READER / 2;

pub type RwLock<T> = lock_api::RwLock<RawSpinRwLock, T>;
pub type RwLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawSpinRwLock, T>;
pub type RwLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawSpinRwLock, T>;

/// Spinning reader-writer lock for the engine tables.
///
/// A writer that fails to get the lock raises `WRITER_WAITING`, which keeps
/// new readers out until it gets in.
pub struct RawSpinRwLock {
    state: AtomicUsize,
}

unsafe impl lock_api::RawRwLock for RawSpinRwLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: RawSpinRwLock = RawSpinRwLock {
        state: AtomicUsize::new(0),
    };

    type GuardMarker = GuardSend;

    fn lock_exclusive(&self) {
        while !self.try_lock_exclusive() {
            self.state.fetch_or(WRITER_WAITING, Ordering::Relaxed);
            spin_loop();
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        let cur = self.state.load(Ordering::Relaxed);
        if cur & (WRITER | READERS_MASK) != 0 {
            return false;
        }
        self.state
            .compare_exchange(cur, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_exclusive(&self) {
        self.state
            .fetch_and(!(WRITER | WRITER_WAITING), Ordering::Release);
    }

    fn lock_shared(&self) {
        while !self.try_lock_shared() {
            spin_loop();
        }
    }

    fn try_lock_shared(&self) -> bool {
        let prev = self.state.fetch_add(READER, Ordering::Acquire);
        if prev > MAX_READERS * READER {
            self.state.fetch_sub(READER, Ordering::Relaxed);
            warn!("rwlock reader count overflow");
            return false;
        }
        if prev & (WRITER | WRITER_WAITING) != 0 {
            self.state.fetch_sub(READER, Ordering::Release);
            return false;
        }
        true
    }

    unsafe fn unlock_shared(&self) {
        self.state.fetch_sub(READER, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) & (WRITER | READERS_MASK) != 0
    }

    fn is_locked_exclusive(&self) -> bool {
        self.state.load(Ordering::Relaxed) & WRITER != 0
    }
}
