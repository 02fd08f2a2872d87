//! Lock-free single-producer/single-consumer FIFO (C1).
//!
//! A ring buffer of capacity rounded up to the next power of two. Exactly
//! one thread may call [`Fifo::push`], exactly one (possibly different)
//! thread may call [`Fifo::pop`]; using more of either without external
//! locking is undefined behaviour, not merely unperformant.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A lock-free SPSC ring buffer holding `T`.
///
/// The store to a slot happens-before the store to the write index that
/// publishes it (`Release`); the load of a slot happens-after the load of
/// the write index (`Acquire`). Producer and consumer indices are each
/// touched by exactly one side, so they're read with `Relaxed` by their
/// owner and with `Acquire`/written with `Release` by the other.
pub struct Fifo<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    write: AtomicUsize,
    read: AtomicUsize,
}

unsafe impl<T: Send> Send for Fifo<T> {}
unsafe impl<T: Send> Sync for Fifo<T> {}

impl<T> Fifo<T> {
    /// Creates a FIFO able to hold at least `capacity` elements. The
    /// actual capacity is rounded up to the next power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(UnsafeCell::new(MaybeUninit::uninit()));
        }
        Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Pushes `value`. Returns `Err(value)` and leaves the queue unchanged
    /// if it is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        if write.wrapping_sub(read) >= self.capacity() {
            return Err(value);
        }
        let slot = &self.slots[write & self.mask];
        unsafe { (*slot.get()).write(value) };
        self.write.store(write.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Pops the oldest pushed value, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        let slot = &self.slots[read & self.mask];
        let value = unsafe { (*slot.get()).assume_init_read() };
        self.read.store(read.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read.load(Ordering::Relaxed) == self.write.load(Ordering::Acquire)
    }
}

impl<T> Drop for Fifo<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_capacity_to_power_of_two() {
        let f: Fifo<u32> = Fifo::new(5);
        assert_eq!(f.capacity(), 8);
    }

    #[test]
    fn push_pop_order() {
        let f = Fifo::new(4);
        assert!(f.push(1).is_ok());
        assert!(f.push(2).is_ok());
        assert_eq!(f.pop(), Some(1));
        assert_eq!(f.pop(), Some(2));
        assert_eq!(f.pop(), None);
    }

    #[test]
    fn push_fails_when_full() {
        let f = Fifo::new(2);
        assert!(f.push(1).is_ok());
        assert!(f.push(2).is_ok());
        assert_eq!(f.push(3), Err(3));
        assert_eq!(f.pop(), Some(1));
        assert!(f.push(3).is_ok());
    }

    #[test]
    fn empty_pop_is_none() {
        let f: Fifo<u32> = Fifo::new(4);
        assert!(f.is_empty());
        assert_eq!(f.pop(), None);
    }
}
