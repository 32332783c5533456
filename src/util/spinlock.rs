//! Module `spinlock` implement a stamped read-write latch, useful for
//! non-blocking concurrency on short critical sections.
//!
//! Readers and writers spin instead of parking. A writer first flips the
//! latch bit, which fences out new readers, then waits for in-flight
//! readers to drain before flipping the lock bit. Guards release their
//! permission on drop along every exit path.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    result,
    sync::atomic::{AtomicU64, Ordering::SeqCst},
};

/// Spinlock implements latch-and-spin mechanism for non-blocking
/// concurrency.
///
/// It uses a single AtomicU64 for:
/// * ref-count of active readers, bits \[0-61\].
/// * latch flag, bit 62.
/// * lock flag, bit 63.
pub struct Spinlock<T> {
    latchlock: AtomicU64,
    value: T,
}

impl<T> Spinlock<T> {
    const LATCH_FLAG: u64 = 0x4000000000000000;
    const LOCK_FLAG: u64 = 0x8000000000000000;
    const LATCH_LOCK_FLAG: u64 = 0xC000000000000000;
    const READERS_FLAG: u64 = 0x3FFFFFFFFFFFFFFF;

    /// Create a new Spinlock guarding `value`.
    pub fn new(value: T) -> Spinlock<T> {
        Spinlock {
            latchlock: AtomicU64::new(0),
            value,
        }
    }

    /// Acquire latch for read permission, spinning until available.
    pub fn read(&self) -> ReadGuard<T> {
        loop {
            match self.try_read() {
                Some(guard) => break guard,
                None => std::hint::spin_loop(),
            }
        }
    }

    /// Non-blocking variant of [Spinlock::read]. Return None if a writer
    /// holds, or is waiting for, the latch.
    pub fn try_read(&self) -> Option<ReadGuard<T>> {
        let old = self.latchlock.load(SeqCst);
        if (old & Self::LATCH_LOCK_FLAG) == 0 {
            // latch is not acquired by a writer
            if self
                .latchlock
                .compare_exchange(old, old + 1, SeqCst, SeqCst)
                .is_ok()
            {
                return Some(ReadGuard { door: self });
            }
        }
        None
    }

    /// Acquire latch for write permission, spinning until all readers
    /// have drained.
    pub fn write(&self) -> WriteGuard<T> {
        // latch
        loop {
            let old = self.latchlock.load(SeqCst);
            if (old & Self::LATCH_FLAG) == 0 {
                assert!(
                    (old & Self::LOCK_FLAG) == 0,
                    "latch off but lock on, call the programmer"
                );
                if self
                    .latchlock
                    .compare_exchange(old, old | Self::LATCH_FLAG, SeqCst, SeqCst)
                    .is_ok()
                {
                    break;
                }
            }
            std::hint::spin_loop();
        }
        // lock, once readers have drained.
        loop {
            let old = self.latchlock.load(SeqCst);
            if (old & Self::READERS_FLAG) == 0 {
                let new = old | Self::LOCK_FLAG;
                if self
                    .latchlock
                    .compare_exchange(old, new, SeqCst, SeqCst)
                    .is_ok()
                {
                    break self.as_write_guard();
                }
                panic!("latched, ZERO readers, but unable to lock, call the programmer");
            }
            std::hint::spin_loop();
        }
    }

    /// Non-blocking variant of [Spinlock::write]. Return None without
    /// latching if any reader or writer is active.
    pub fn try_write(&self) -> Option<WriteGuard<T>> {
        let old = self.latchlock.load(SeqCst);
        if old != 0 {
            return None;
        }
        match self
            .latchlock
            .compare_exchange(0, Self::LATCH_LOCK_FLAG, SeqCst, SeqCst)
        {
            Ok(_) => Some(self.as_write_guard()),
            Err(_) => None,
        }
    }

    fn as_write_guard(&self) -> WriteGuard<T> {
        let door = unsafe {
            let door = self as *const Self as *mut Self;
            door.as_mut().unwrap()
        };
        WriteGuard { door }
    }
}

/// Type to handle read-latch, the latch is released when guard is dropped.
pub struct ReadGuard<'a, T> {
    door: &'a Spinlock<T>,
}

impl<'a, T> Deref for ReadGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.door.value
    }
}

impl<'a, T> Drop for ReadGuard<'a, T> {
    fn drop(&mut self) {
        self.door.latchlock.fetch_sub(1, SeqCst);
    }
}

/// Type to handle write-latch, the latch is released when guard is dropped.
pub struct WriteGuard<'a, T> {
    door: &'a mut Spinlock<T>,
}

impl<'a, T> Deref for WriteGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.door.value
    }
}

impl<'a, T> DerefMut for WriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.door.value
    }
}

impl<'a, T> Drop for WriteGuard<'a, T> {
    fn drop(&mut self) {
        let old = self.door.latchlock.load(SeqCst);
        assert!(
            (old & Spinlock::<T>::READERS_FLAG) == 0,
            "active readers while lock is held, call the programmer"
        );
        if self
            .door
            .latchlock
            .compare_exchange(old, 0, SeqCst, SeqCst)
            .is_err()
        {
            panic!("readers/writers arrived while locked, call the programmer")
        }
    }
}

impl<T> fmt::Debug for Spinlock<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "Spinlock<{:X}>", self.latchlock.load(SeqCst))
    }
}

#[cfg(test)]
#[path = "spinlock_test.rs"]
mod spinlock_test;
