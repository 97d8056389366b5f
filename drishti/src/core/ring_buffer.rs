//! Fixed-capacity history buffer with O(1) eviction
//!
//! Used for every bounded history in a session (quality window, state
//! transitions, adaptation audit trail). Once full, each push overwrites the
//! oldest entry in place instead of shifting the whole vector.

use serde::{Serialize, Serializer};

/// Ring buffer ordered oldest → newest.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    head: usize, // Oldest element once full; stays 0 while filling
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Append a value, returning the evicted oldest value when full.
    #[inline]
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.data.len() < self.capacity {
            self.data.push(value);
            None
        } else {
            let evicted = std::mem::replace(&mut self.data[self.head], value);
            self.head = (self.head + 1) % self.capacity;
            Some(evicted)
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Element at logical index (0 = oldest).
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.data.len() {
            Some(&self.data[(self.head + index) % self.data.len()])
        } else {
            None
        }
    }

    /// Most recently pushed element.
    #[inline]
    pub fn latest(&self) -> Option<&T> {
        self.data.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Oldest retained element.
    #[inline]
    pub fn oldest(&self) -> Option<&T> {
        self.get(0)
    }

    /// Iterate oldest → newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        let len = self.data.len();
        (0..len).map(move |i| &self.data[(self.head + i) % len])
    }

    /// Iterate over the newest `n` elements, oldest first.
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &T> + '_ {
        let skip = self.data.len().saturating_sub(n);
        self.iter().skip(skip)
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    /// Drop everything except the newest `keep` elements.
    pub fn retain_latest(&mut self, keep: usize) {
        if keep >= self.data.len() {
            return;
        }
        let len = self.data.len();
        self.data.rotate_left(self.head % len);
        self.head = 0;
        self.data.drain(..len - keep);
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy out the contents, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T: Serialize> Serialize for RingBuffer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
