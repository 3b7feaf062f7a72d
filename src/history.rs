use std::collections::VecDeque;
use std::fmt;

/// Bounded history of per-frame values, newest first.
///
/// Entries are immutable once pushed; when the buffer is full the oldest
/// entry is evicted. `total()` keeps counting across evictions so frame
/// alignment can still be checked.
pub struct History<T> {
    deque: VecDeque<T>,
    capacity: usize,
    total: u64,
}

impl<T: Clone> Clone for History<T> {
    fn clone(&self) -> Self {
        Self {
            deque: self.deque.clone(),
            capacity: self.capacity,
            total: self.total,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for History<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deque.fmt(f)
    }
}

impl<T> History<T> {
    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            deque: VecDeque::with_capacity(cap),
            capacity: cap,
            total: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.deque.len() == self.capacity {
            self.deque.pop_back();
        }
        self.deque.push_front(item);
        self.total += 1;
    }

    /// Most recent entry.
    #[inline]
    pub fn latest(&self) -> Option<&T> {
        self.deque.front()
    }

    /// Entry `k` steps back; `back(0)` is the latest.
    #[inline]
    pub fn back(&self, k: usize) -> Option<&T> {
        self.deque.get(k)
    }

    #[inline]
    pub fn oldest(&self) -> Option<&T> {
        self.deque.back()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    /// Number of entries ever pushed, including evicted ones.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[inline]
    pub fn clear(&mut self) {
        self.deque.clear();
    }

    /// Newest to oldest.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &'_ T> {
        self.deque.iter()
    }

    /// Oldest to newest.
    #[inline]
    pub fn asc_iter(&self) -> impl Iterator<Item = &'_ T> {
        self.deque.iter().rev()
    }
}
