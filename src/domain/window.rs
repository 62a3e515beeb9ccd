//! Fixed-capacity, insertion-ordered window.
//!
//! Backs the price history, candle sequence and brick deque. Pushing past
//! capacity evicts the oldest entry.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct BoundedWindow<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T> BoundedWindow<T> {
    /// A capacity of zero is treated as one.
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            items: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Builds a window from an ordered sequence, keeping only the newest `cap` items.
    pub fn seeded<I: IntoIterator<Item = T>>(cap: usize, items: I) -> Self {
        let mut window = Self::new(cap);
        for item in items {
            window.push(item);
        }
        window
    }

    /// Appends an item and returns the evicted one, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.cap {
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

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> BoundedWindow<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
