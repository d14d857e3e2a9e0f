//! Bounded window of the most recent items

use std::collections::VecDeque;

use serde::Serialize;

/// An item tagged with its arrival sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentEntry<T> {
    /// Monotonic per window, starting at 0
    pub id: u64,
    pub item: T,
}

/// FIFO of at most `capacity` items, oldest first.
#[derive(Debug)]
pub struct RecentItems<T> {
    capacity: usize,
    next_id: u64,
    items: VecDeque<RecentEntry<T>>,
}

impl<T: Clone> RecentItems<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_id: 0,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `item`, evicting and returning the oldest entry when full.
    ///
    /// A zero-capacity window hands the new entry straight back.
    pub fn push(&mut self, item: T) -> Option<RecentEntry<T>> {
        let entry = RecentEntry {
            id: self.next_id,
            item,
        };
        self.next_id += 1;

        if self.capacity == 0 {
            return Some(entry);
        }

        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(entry);
        evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecentEntry<T>> {
        self.items.iter()
    }

    pub fn latest(&self) -> Option<&RecentEntry<T>> {
        self.items.back()
    }

    /// Clone of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<RecentEntry<T>> {
        self.items.iter().cloned().collect()
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

    /// Total number of items ever pushed.
    pub fn total_pushed(&self) -> u64 {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_evicts_oldest_when_full() {
        let mut recent = RecentItems::new(2);
        assert_eq!(recent.push("a"), None);
        assert_eq!(recent.push("b"), None);

        let evicted = recent.push("c").unwrap();
        assert_eq!(evicted, RecentEntry { id: 0, item: "a" });

        let items: Vec<&str> = recent.iter().map(|e| e.item).collect();
        assert_eq!(items, vec!["b", "c"]);
        assert_eq!(recent.latest().unwrap().id, 2);
        assert_eq!(recent.total_pushed(), 3);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut recent = RecentItems::new(0);
        assert_eq!(recent.push(1).map(|e| e.item), Some(1));
        assert!(recent.is_empty());
    }
}
