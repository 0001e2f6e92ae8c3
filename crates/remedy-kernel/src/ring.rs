//! Fixed-capacity ring buffer
//!
//! Insertion beyond capacity evicts the oldest entry in O(1). Iteration is
//! always in insertion order, oldest first.

use std::collections::VecDeque;

/// Bounded FIFO history
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    total_inserted: u64,
}

impl<T> RingBuffer<T> {
    /// Create a ring holding at most `capacity` entries (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            total_inserted: 0,
        }
    }

    /// Append an entry, returning the evicted oldest entry when full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        self.total_inserted += 1;
        evicted
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        self.items.iter()
    }

    /// Most recently inserted entry
    #[inline]
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// First entry matching the predicate
    pub fn find<P>(&self, mut predicate: P) -> Option<&T>
    where
        P: FnMut(&T) -> bool,
    {
        self.items.iter().find(|item| predicate(item))
    }

    /// Drop entries that fail the predicate, returning how many were removed
    pub fn retain<P>(&mut self, predicate: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        let before = self.items.len();
        self.items.retain(predicate);
        before - self.items.len()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries ever pushed
    #[inline]
    #[must_use]
    pub fn total_inserted(&self) -> u64 {
        self.total_inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent_entries_in_order() {
        let mut ring = RingBuffer::new(3);
        for i in 0..5 {
            ring.push(i);
        }

        let kept: Vec<_> = ring.iter().copied().collect();
        assert_eq!(kept, vec![2, 3, 4]);
        assert_eq!(ring.total_inserted(), 5);
        assert_eq!(ring.latest(), Some(&4));
    }

    #[test]
    fn push_reports_evicted_entry() {
        let mut ring = RingBuffer::new(2);
        assert_eq!(ring.push("a"), None);
        assert_eq!(ring.push("b"), None);
        assert_eq!(ring.push("c"), Some("a"));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut ring = RingBuffer::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn retain_removes_matching() {
        let mut ring = RingBuffer::new(4);
        for i in 0..4 {
            ring.push(i);
        }
        assert_eq!(ring.retain(|i| i % 2 == 0), 2);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(ring.find(|i| *i > 0), Some(&2));
    }
}
