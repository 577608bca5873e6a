//! Bounded memory of alert ids that have already been handled.
//!
//! A FIFO ring (`VecDeque`) paired with a `HashSet` index: membership is O(1)
//! and once the window is full every new id evicts exactly the oldest one.

use std::collections::{HashSet, VecDeque};

pub const DEFAULT_CAPACITY: usize = 1000;

pub struct DedupWindow {
    order: VecDeque<String>,
    index: HashSet<String>,
    capacity: usize,
}

impl DedupWindow {
    /// `capacity` is clamped to at least 1. At most `DEFAULT_CAPACITY` slots
    /// are reserved up front; the rest grows on demand.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let reserve = capacity.min(DEFAULT_CAPACITY);
        Self {
            order: VecDeque::with_capacity(reserve),
            index: HashSet::with_capacity(reserve),
            capacity,
        }
    }

    pub fn seen(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Remember `id`. Returns `false` when it was already in the window
    /// (nothing changes in that case).
    pub fn record(&mut self, id: &str) -> bool {
        if self.index.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.index.remove(&oldest);
            }
        }
        self.order.push_back(id.to_owned());
        self.index.insert(id.to_owned());
        true
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_seen() {
        let mut window = DedupWindow::new(3);
        assert!(!window.seen("a"));
        assert!(window.record("a"));
        assert!(window.seen("a"));
    }

    #[test]
    fn record_is_idempotent() {
        let mut window = DedupWindow::new(3);
        window.record("a");
        let before = window.len();
        assert!(!window.record("a"));
        assert_eq!(window.len(), before);
        assert!(window.seen("a"));
    }

    #[test]
    fn evicts_oldest_first() {
        let mut window = DedupWindow::new(3);
        for id in ["a", "b", "c", "d"] {
            window.record(id);
        }
        assert!(!window.seen("a"));
        assert!(window.seen("b") && window.seen("c") && window.seen("d"));
        window.record("e");
        assert!(!window.seen("b"));
        assert!(window.seen("c"));
    }

    #[test]
    fn re_recording_does_not_refresh_position() {
        let mut window = DedupWindow::new(2);
        window.record("a");
        window.record("b");
        window.record("a");
        window.record("c");
        assert!(!window.seen("a"), "a was oldest and must go first");
        assert!(window.seen("b") && window.seen("c"));
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut window = DedupWindow::new(7);
        for i in 0..500 {
            // Mix of fresh and repeated ids.
            window.record(&(i % 13).to_string());
            window.record(&i.to_string());
            assert!(window.len() <= window.capacity());
        }
        assert_eq!(window.len(), 7);
    }

    #[test]
    fn thousand_and_one_ids_drop_the_first() {
        let mut window = DedupWindow::default();
        for i in 0..1001 {
            window.record(&format!("id-{i}"));
        }
        assert_eq!(window.len(), 1000);
        assert!(!window.seen("id-0"));
        assert!((1..1001).all(|i| window.seen(&format!("id-{i}"))));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut window = DedupWindow::new(0);
        window.record("x");
        assert_eq!(window.capacity(), 1);
        assert!(window.seen("x"));
        window.record("y");
        assert!(!window.seen("x"));
    }

    #[test]
    fn unbounded_capacity_does_not_reserve_up_front() {
        let mut window = DedupWindow::new(usize::MAX);
        assert_eq!(window.capacity(), usize::MAX);
        assert!(window.is_empty());
        for i in 0..2000 {
            assert!(window.record(&i.to_string()));
        }
        assert_eq!(window.len(), 2000);
        assert!(window.seen("0") && window.seen("1999"));
    }
}
