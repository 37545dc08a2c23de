//! A writer-preferring reader/writer lock.
//!
//! [`RwLock`] lets any number of readers hold the lock at once as long as no
//! writer holds it or is waiting for it. Once a writer is waiting, new readers
//! queue behind it, so a steady stream of readers cannot starve writers.
//!
//! Wake-ups are targeted. Waiting writers and waiting readers sleep on
//! separate condition variables:
//!
//! - When the last reader leaves and a writer is waiting, exactly one writer is woken.
//! - When a writer leaves, one waiting writer is woken if there is one;
//!   otherwise every waiting reader is woken, since all of them may proceed together.
//!
//! Acquisition returns an RAII guard; dropping the guard (including during
//! unwinding) releases the lock exactly once. The lock does not poison.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct LockState {
    active_readers: usize,
    writer_active: bool,
    waiting_writers: usize,
    waiting_readers: usize,
}

/// A reader/writer lock with writer preference.
pub struct RwLock<T: ?Sized> {
    state: Mutex<LockState>,
    readers: Condvar,
    writers: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is mediated by `state`: shared references are only
// handed out while no writer is active, and the unique reference only while
// no reader or other writer is active.
unsafe impl<T: ?Sized + Send> Send for RwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Creates an unlocked lock holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            readers: Condvar::new(),
            writers: Condvar::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Consumes the lock, returning the data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> RwLock<T> {
    // The state mutex is only held for a few field updates that cannot
    // panic, so a poisoned state is still consistent.
    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires shared access, blocking while a writer holds or awaits the lock.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let mut state = self.lock_state();
        while state.writer_active || state.waiting_writers > 0 {
            state.waiting_readers += 1;
            state = self.readers.wait(state).unwrap_or_else(PoisonError::into_inner);
            state.waiting_readers -= 1;
        }
        state.active_readers += 1;
        ReadGuard { lock: self }
    }

    /// Acquires shared access if that is possible without blocking.
    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        let mut state = self.lock_state();
        if state.writer_active || state.waiting_writers > 0 {
            return None;
        }
        state.active_readers += 1;
        Some(ReadGuard { lock: self })
    }

    /// Acquires exclusive access, blocking until every holder has left.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut state = self.lock_state();
        state.waiting_writers += 1;
        while state.writer_active || state.active_readers > 0 {
            state = self.writers.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.waiting_writers -= 1;
        state.writer_active = true;
        WriteGuard { lock: self }
    }

    /// Acquires exclusive access if that is possible without blocking.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        let mut state = self.lock_state();
        if state.writer_active || state.active_readers > 0 {
            return None;
        }
        state.writer_active = true;
        Some(WriteGuard { lock: self })
    }

    /// Returns a mutable reference to the data; no locking is needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Number of writers currently blocked in [`RwLock::write`].
    pub fn waiting_writers(&self) -> usize {
        self.lock_state().waiting_writers
    }

    /// Number of readers currently blocked in [`RwLock::read`].
    pub fn waiting_readers(&self) -> usize {
        self.lock_state().waiting_readers
    }

    fn release_read(&self) {
        let mut state = self.lock_state();
        state.active_readers -= 1;
        if state.active_readers == 0 && state.waiting_writers > 0 {
            self.writers.notify_one();
        }
    }

    fn release_write(&self) {
        let mut state = self.lock_state();
        state.writer_active = false;
        if state.waiting_writers > 0 {
            self.writers.notify_one();
        } else if state.waiting_readers > 0 {
            self.readers.notify_all();
        }
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("RwLock")
            .field("active_readers", &state.active_readers)
            .field("writer_active", &state.writer_active)
            .field("waiting_writers", &state.waiting_writers)
            .field("waiting_readers", &state.waiting_readers)
            .finish_non_exhaustive()
    }
}

/// Shared access to the data of an [`RwLock`]. Releases on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
}

impl<T: ?Sized> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: a live read guard means no writer is active.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Exclusive access to the data of an [`RwLock`]. Releases on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
}

impl<T: ?Sized> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: a live write guard means this is the only holder.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: a live write guard means this is the only holder.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}
