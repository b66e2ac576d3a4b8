// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Fixed-capacity circular buffer
//!
//! Slots are allocated once at construction. Pushing into a full ring
//! overwrites the oldest entry and hands it back to the caller.

/// Circular buffer of `capacity` slots
#[derive(Debug)]
pub struct Ring<T> {
    entries: Vec<Option<T>>,
    write_index: usize,
    count: usize,
}

impl<T> Ring<T> {
    /// Create an empty ring
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self {
            entries,
            write_index: 0,
            count: 0,
        }
    }

    /// Number of slots
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of occupied slots
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Check if the ring is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if the next push will evict
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    /// Store `entry`, returning the evicted oldest entry if the ring was full
    ///
    /// A zero-capacity ring hands `entry` straight back.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let capacity = self.capacity();
        if capacity == 0 {
            return Some(entry);
        }
        let evicted = self.entries[self.write_index].replace(entry);
        self.write_index = (self.write_index + 1) % capacity;
        if self.count < capacity {
            self.count += 1;
        }
        evicted
    }

    fn start(&self) -> usize {
        if self.count < self.capacity() {
            0
        } else {
            self.write_index
        }
    }

    /// Entry at logical position `index` (0 = oldest)
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.count {
            return None;
        }
        let slot = (self.start() + index) % self.capacity();
        self.entries[slot].as_ref()
    }

    /// Oldest entry
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    /// Iterate oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.count).filter_map(move |i| self.get(i))
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            *entry = None;
        }
        self.write_index = 0;
        self.count = 0;
    }
}
