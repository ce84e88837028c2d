//! Fixed-capacity ring buffer holding the most recently submitted
//! parameter tuples of a database sink.

/// Ring buffer that evicts its oldest entry once full.
///
/// Positions are logical: `get(0)` is the oldest retained entry and
/// `get(len() - 1)` the newest, independent of where the ring currently
/// wraps.
#[derive(Debug, Clone)]
pub struct History<T> {
    slots: Vec<T>,
    /// Physical index of the oldest entry once the buffer has wrapped.
    start: usize,
    capacity: usize,
}

impl<T> History<T> {
    /// Creates an empty buffer. A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            start: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Appends an entry, returning the evicted oldest entry when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
            return None;
        }

        let evicted = std::mem::replace(&mut self.slots[self.start], item);
        self.start = (self.start + 1) % self.capacity;
        Some(evicted)
    }

    fn get(&self, index: usize) -> Option<&T> {
        if index >= self.slots.len() {
            return None;
        }
        self.slots.get((self.start + index) % self.slots.len())
    }

    /// The newest `n` entries, oldest first. Yields fewer when the buffer
    /// holds fewer than `n`.
    pub fn last(&self, n: usize) -> impl Iterator<Item = &T> {
        let len = self.slots.len();
        let n = n.min(len);
        (len - n..len).filter_map(move |i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(history: &History<u32>) -> Vec<u32> {
        history.last(history.len()).copied().collect()
    }

    #[test]
    fn test_fills_then_evicts_oldest() {
        let mut history = History::with_capacity(3);
        assert_eq!(history.push(1), None);
        assert_eq!(history.push(2), None);
        assert_eq!(history.push(3), None);
        assert_eq!(collect(&history), vec![1, 2, 3]);

        assert_eq!(history.push(4), Some(1));
        assert_eq!(history.push(5), Some(2));
        assert_eq!(collect(&history), vec![3, 4, 5]);
        assert_eq!(history.len(), 3);
        assert_eq!(history.get(0), Some(&3));
        assert_eq!(history.get(2), Some(&5));
        assert_eq!(history.get(3), None);
    }

    #[test]
    fn test_last_n_across_wrap() {
        let mut history = History::with_capacity(4);
        for i in 1..=6 {
            history.push(i);
        }
        let last: Vec<u32> = history.last(3).copied().collect();
        assert_eq!(last, vec![4, 5, 6]);

        let all: Vec<u32> = history.last(10).copied().collect();
        assert_eq!(all, vec![3, 4, 5, 6]);

        assert_eq!(history.last(0).count(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut history = History::with_capacity(0);
        assert_eq!(history.capacity(), 1);
        history.push(7);
        history.push(8);
        assert_eq!(collect(&history), vec![8]);
    }
}
