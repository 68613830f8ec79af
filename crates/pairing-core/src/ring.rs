//! Fixed-capacity FIFO history.
//!
//! Every rolling log in the engine (evidence, predictions, drift events,
//! ship timestamps, approval latencies) is a `Ring`: pushing past capacity
//! evicts the oldest entry.

use std::collections::VecDeque;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone)]
pub struct Ring<T> {
    items: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T> Ring<T> {
    /// A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted: 0,
        }
    }

    /// Append, evicting and returning the oldest entry when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.evicted += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries ever evicted; `evicted + len` is the total pushed.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn total_pushed(&self) -> u64 {
        self.evicted + self.items.len() as u64
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Newest first.
    pub fn iter_newest(&self) -> impl Iterator<Item = &T> {
        self.items.iter().rev()
    }

    /// The `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().skip(self.items.len().saturating_sub(n))
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.evicted = 0;
    }
}

impl<T: Serialize> Serialize for Ring<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity() {
        let mut ring = Ring::new(3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.last(), Some(&2));
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut ring = Ring::new(3);
        for i in 1..=3 {
            ring.push(i);
        }
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(ring.evicted(), 1);
        assert_eq!(ring.total_pushed(), 4);
    }

    #[test]
    fn test_recent_and_newest() {
        let mut ring = Ring::new(10);
        for i in 0..6 {
            ring.push(i);
        }
        assert_eq!(ring.recent(2).copied().collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(ring.recent(50).count(), 6);
        assert_eq!(ring.iter_newest().next(), Some(&5));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut ring = Ring::new(0);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.last(), Some(&"b"));
    }

    #[test]
    fn test_serializes_as_list() {
        let mut ring = Ring::new(2);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(serde_json::to_string(&ring).unwrap(), "[2,3]");
    }
}
