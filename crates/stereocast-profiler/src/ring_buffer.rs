//! Fixed-capacity ring buffers.

use std::cell::{Cell, UnsafeCell};
use std::collections::VecDeque;

/// Fixed-capacity FIFO queue filled through a shared reference.
///
/// The buffer is `Send` but not `Sync`: producer and consumer are always the
/// owning thread, so pushes from scope guards never race with each other or
/// with a drain. `N` must be a power of two; one slot stays free to tell
/// full from empty.
pub struct RingBuffer<T, const N: usize> {
    buffer: UnsafeCell<[T; N]>,
    head: Cell<usize>,
    tail: Cell<usize>,
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "ring buffer capacity must be a power of two");
        N - 1
    };

    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: UnsafeCell::new([T::default(); N]),
            head: Cell::new(0),
            tail: Cell::new(0),
        }
    }

    /// Returns `false` if the buffer is full.
    pub fn push(&self, value: T) -> bool {
        let head = self.head.get();
        let tail = self.tail.get();

        let next_head = (head + 1) & Self::MASK;
        if next_head == tail {
            return false;
        }

        // SAFETY: the buffer is not `Sync`, so no other push or pop runs
        // concurrently and no reference into the array outlives this write.
        unsafe {
            (*self.buffer.get())[head] = value;
        }

        self.head.set(next_head);
        true
    }

    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.get();
        let head = self.head.get();

        if tail == head {
            return None;
        }

        // SAFETY: as in `push`, no other access to the array is live.
        let value = unsafe { (*self.buffer.get())[tail] };

        self.tail.set((tail + 1) & Self::MASK);
        Some(value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let head = self.head.get();
        let tail = self.tail.get();
        head.wrapping_sub(tail) & Self::MASK
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drain(&self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len());
        while let Some(value) = self.pop() {
            values.push(value);
        }
        values
    }
}

/// Last `capacity` values, oldest dropped first.
#[derive(Clone, Debug)]
pub struct History<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> History<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, value: T) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.values.iter().copied()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventCategory, TimingEvent};

    #[test]
    fn push_pop_in_order() {
        let buffer = RingBuffer::<TimingEvent, 256>::new();
        for i in 0..100 {
            assert!(buffer.push(TimingEvent::new(EventCategory::TileDraw, i)));
        }
        assert_eq!(buffer.len(), 100);

        for i in 0..100 {
            assert_eq!(buffer.pop().unwrap().duration_ns, i);
        }
        assert!(buffer.is_empty());
        assert!(buffer.pop().is_none());
    }

    #[test]
    fn full_buffer_rejects() {
        let buffer = RingBuffer::<u64, 4>::new();
        assert!(buffer.push(1));
        assert!(buffer.push(2));
        assert!(buffer.push(3));
        assert!(!buffer.push(4));
        assert_eq!(buffer.drain(), vec![1, 2, 3]);
        assert!(buffer.push(4));
    }

    #[test]
    fn wraps_around() {
        let buffer = RingBuffer::<u64, 8>::new();
        for round in 0..5 {
            for i in 0..6 {
                buffer.push(round * 10 + i);
            }
            assert_eq!(buffer.drain().len(), 6);
        }
    }

    #[test]
    fn history_keeps_the_latest() {
        let mut history = History::new(3);
        for v in 1..=5 {
            history.push(v);
        }
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(history.len(), 3);
        history.clear();
        assert!(history.is_empty());
    }
}
