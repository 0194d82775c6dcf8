//! A binary min-heap keyed by an unsigned integer priority.
//!
//! Used as the frontier of the distance-cache refresher. There is
//! deliberately no decrease-key operation: callers re-push a node when they
//! improve its distance and filter stale entries at pop time by comparing the
//! entry's priority against the node's current distance. Marking visited on
//! the node and re-pushing is empirically faster than maintaining heap
//! positions.

/// A min-heap of `(priority, item)` pairs. Not stable: the pop order among
/// equal priorities is unspecified.
pub struct MinHeap<T> {
    entries: Vec<Entry<T>>,
}

struct Entry<T> {
    priority: u32,
    item: T,
}

impl<T> MinHeap<T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Insert an item. O(log n).
    pub fn push(&mut self, item: T, priority: u32) {
        self.entries.push(Entry { priority, item });
        self.sift_up(self.entries.len() - 1);
    }

    /// Remove and return the minimum-priority entry. O(log n).
    pub fn pop_min(&mut self) -> Option<(u32, T)> {
        if self.entries.is_empty() {
            return None;
        }

        let last = self.entries.len() - 1;
        self.entries.swap(0, last);
        let entry = self.entries.pop().expect("checked non-empty");
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        Some((entry.priority, entry.item))
    }

    /// The minimum priority currently in the heap, if any.
    pub fn peek_priority(&self) -> Option<u32> {
        self.entries.first().map(|entry| entry.priority)
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.entries[idx].priority >= self.entries[parent].priority {
                break;
            }
            self.entries.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;

            if left < len
                && self.entries[left].priority
                    < self.entries[smallest].priority
            {
                smallest = left;
            }
            if right < len
                && self.entries[right].priority
                    < self.entries[smallest].priority
            {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.entries.swap(idx, smallest);
            idx = smallest;
        }
    }
}

impl<T> Default for MinHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}
