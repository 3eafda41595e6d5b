//! Fixed-capacity ring buffer
//!
//! Slots are allocated once; after the buffer fills, each push overwrites
//! the oldest slot under a wrapping cursor.

use crate::{TeError, TeResult};

/// Bounded FIFO with ring semantics
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    /// Next slot to write; equals the oldest slot once full
    cursor: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` items
    pub fn new(capacity: usize) -> TeResult<Self> {
        if capacity == 0 {
            return Err(TeError::Config("ring buffer capacity must be positive".into()));
        }
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        })
    }

    /// Append an item, returning the evicted oldest item on overflow
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.slots.len() < self.capacity {
            self.slots.push(item);
            None
        } else {
            Some(std::mem::replace(&mut self.slots[self.cursor], item))
        };
        self.cursor = (self.cursor + 1) % self.capacity;
        evicted
    }

    /// Number of items held
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the next push evicts
    #[inline]
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Maximum number of items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Item at logical position `index` (0 = oldest)
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.slots.len() {
            return None;
        }
        self.slots.get(self.physical(index))
    }

    /// Most recently pushed item
    pub fn newest(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.slots.len()).map(move |i| &self.slots[self.physical(i)])
    }

    /// Drop all items, keeping the allocation
    pub fn clear(&mut self) {
        self.slots.clear();
        self.cursor = 0;
    }

    #[inline]
    fn physical(&self, index: usize) -> usize {
        if self.is_full() {
            (self.cursor + index) % self.capacity
        } else {
            index
        }
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy out the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}
