//! Indexed binary min-heap used as the A* open set.
//!
//! Items are dense `usize` ids (node indices). Every queued item's heap slot is
//! tracked in a position table so priorities can be changed and items removed in
//! `O(log n)` without searching the heap.

const ABSENT: u32 = u32::MAX;

/// Binary min-heap keyed by `P` with decrease-key support.
///
/// The position table grows to the largest item id ever pushed and is never
/// shrunk, so a queue embedded in a search object is reused without reallocation.
#[derive(Debug, Clone)]
pub struct PriorityQueue<P> {
    heap: Vec<(usize, P)>,
    positions: Vec<u32>,
}

impl<P> Default for PriorityQueue<P> {
    fn default() -> Self {
        PriorityQueue {
            heap: Vec::new(),
            positions: Vec::new(),
        }
    }
}

impl<P: PartialOrd + Copy> PriorityQueue<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue able to hold item ids `0..capacity` without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut queue = Self::default();
        queue.reserve_items(capacity);
        queue
    }

    /// Makes sure item ids `0..capacity` can be queued without reallocating.
    pub fn reserve_items(&mut self, capacity: usize) {
        if self.positions.len() < capacity {
            self.positions.resize(capacity, ABSENT);
        }
        if self.heap.capacity() < capacity {
            self.heap.reserve(capacity - self.heap.len());
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns true if `item` is currently queued.
    #[inline]
    pub fn contains(&self, item: usize) -> bool {
        self.positions.get(item).is_some_and(|&p| p != ABSENT)
    }

    /// Returns the priority `item` is queued with.
    pub fn priority_of(&self, item: usize) -> Option<P> {
        match self.positions.get(item) {
            Some(&p) if p != ABSENT => Some(self.heap[p as usize].1),
            _ => None,
        }
    }

    /// Returns the lowest priority item without removing it.
    pub fn peek(&self) -> Option<(usize, P)> {
        self.heap.first().copied()
    }

    /// Queues `item`. Panics if the item is already queued.
    pub fn push(&mut self, item: usize, priority: P) {
        if item >= self.positions.len() {
            self.positions.resize(item + 1, ABSENT);
        }
        assert!(
            self.positions[item] == ABSENT,
            "item {item} is already in the priority queue"
        );

        let slot = self.heap.len();
        self.heap.push((item, priority));
        self.positions[item] = slot as u32;
        self.sift_up(slot);
    }

    /// Removes and returns the item with the lowest priority.
    ///
    /// # Panics
    /// The queue must not be empty. Use [`PriorityQueue::try_pop`] otherwise.
    pub fn pop(&mut self) -> (usize, P) {
        self.try_pop().expect("pop called on an empty priority queue")
    }

    /// Removes and returns the item with the lowest priority, if any.
    pub fn try_pop(&mut self) -> Option<(usize, P)> {
        if self.heap.is_empty() {
            return None;
        }
        Some(self.remove_slot(0))
    }

    /// Moves an already queued item to `priority`, in either direction.
    /// Returns false if the item is not queued.
    pub fn update_priority(&mut self, item: usize, priority: P) -> bool {
        let Some(&slot) = self.positions.get(item) else {
            return false;
        };
        if slot == ABSENT {
            return false;
        }

        let slot = slot as usize;
        let old = self.heap[slot].1;
        self.heap[slot].1 = priority;
        if priority < old {
            self.sift_up(slot);
        } else {
            self.sift_down(slot);
        }
        true
    }

    /// Removes `item` from the queue, returning its priority.
    pub fn remove(&mut self, item: usize) -> Option<P> {
        match self.positions.get(item) {
            Some(&p) if p != ABSENT => Some(self.remove_slot(p as usize).1),
            _ => None,
        }
    }

    /// Empties the queue. Only the slots of items still queued are reset, storage is kept.
    pub fn clear(&mut self) {
        for &(item, _) in &self.heap {
            self.positions[item] = ABSENT;
        }
        self.heap.clear();
    }

    /// Iterates the queued items in heap order (not sorted).
    pub fn iter(&self) -> impl Iterator<Item = (usize, P)> + '_ {
        self.heap.iter().copied()
    }

    fn remove_slot(&mut self, slot: usize) -> (usize, P) {
        let last = self.heap.len() - 1;
        self.heap.swap(slot, last);
        let removed = self.heap.pop().expect("heap has at least one element");
        self.positions[removed.0] = ABSENT;

        if slot < self.heap.len() {
            self.positions[self.heap[slot].0] = slot as u32;
            // The element moved into the hole may need to travel either way.
            if slot > 0 && self.heap[slot].1 < self.heap[(slot - 1) / 2].1 {
                self.sift_up(slot);
            } else {
                self.sift_down(slot);
            }
        }

        removed
    }

    fn sift_up(&mut self, mut slot: usize) {
        let entry = self.heap[slot];
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if entry.1 < self.heap[parent].1 {
                self.heap[slot] = self.heap[parent];
                self.positions[self.heap[slot].0] = slot as u32;
                slot = parent;
            } else {
                break;
            }
        }
        self.heap[slot] = entry;
        self.positions[entry.0] = slot as u32;
    }

    fn sift_down(&mut self, mut slot: usize) {
        let entry = self.heap[slot];
        let len = self.heap.len();
        loop {
            let left = slot * 2 + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.heap[right].1 < self.heap[left].1 {
                right
            } else {
                left
            };

            if self.heap[child].1 < entry.1 {
                self.heap[slot] = self.heap[child];
                self.positions[self.heap[slot].0] = slot as u32;
                slot = child;
            } else {
                break;
            }
        }
        self.heap[slot] = entry;
        self.positions[entry.0] = slot as u32;
    }

    #[cfg(test)]
    fn is_valid(&self) -> bool {
        let ordered = (1..self.heap.len()).all(|i| !(self.heap[i].1 < self.heap[(i - 1) / 2].1));
        let indexed = self
            .heap
            .iter()
            .enumerate()
            .all(|(slot, &(item, _))| self.positions[item] == slot as u32);
        let tracked = self.positions.iter().filter(|&&p| p != ABSENT).count() == self.heap.len();
        ordered && indexed && tracked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_in_priority_order() {
        let mut queue = PriorityQueue::new();
        for (item, priority) in [(3, 5.0), (1, 2.0), (7, 9.0), (0, 1.0), (4, 3.0)] {
            queue.push(item, priority);
            assert!(queue.is_valid());
        }

        let order: Vec<usize> = std::iter::from_fn(|| queue.try_pop().map(|(i, _)| i)).collect();
        assert_eq!(order, vec![0, 1, 4, 3, 7]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_update_priority_moves_both_ways() {
        let mut queue = PriorityQueue::with_capacity(8);
        for item in 0..8 {
            queue.push(item, item as f32);
        }

        assert!(queue.update_priority(6, -1.0));
        assert!(queue.is_valid());
        assert_eq!(queue.peek(), Some((6, -1.0)));

        assert!(queue.update_priority(6, 100.0));
        assert!(queue.is_valid());
        assert_eq!(queue.peek(), Some((0, 0.0)));
        assert_eq!(queue.priority_of(6), Some(100.0));

        assert!(!queue.update_priority(42, 0.0));
    }

    #[test]
    fn test_remove_and_contains() {
        let mut queue = PriorityQueue::new();
        for item in 0..10 {
            queue.push(item, (10 - item) as f32);
        }

        assert!(queue.contains(3));
        assert_eq!(queue.remove(3), Some(7.0));
        assert!(!queue.contains(3));
        assert!(queue.is_valid());
        assert_eq!(queue.remove(3), None);
        assert_eq!(queue.len(), 9);
        assert_eq!(queue.pop(), (9, 1.0));
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut queue = PriorityQueue::with_capacity(64);
        for item in 0..64 {
            queue.push(item, item as f32);
        }
        let capacity = queue.heap.capacity();

        queue.clear();

        assert!(queue.is_empty());
        assert!(!queue.contains(10));
        assert_eq!(queue.heap.capacity(), capacity);
        assert!(queue.is_valid());

        // Items can be queued again after clearing.
        queue.push(10, 1.0);
        assert_eq!(queue.pop(), (10, 1.0));
    }

    #[test]
    fn test_tuple_priorities_break_ties() {
        let mut queue = PriorityQueue::new();
        queue.push(0, (2.0, 1.0));
        queue.push(1, (2.0, 0.5));
        queue.push(2, (1.0, 3.0));

        assert_eq!(queue.pop().0, 2);
        assert_eq!(queue.pop().0, 1);
        assert_eq!(queue.pop().0, 0);
    }

    #[test]
    #[should_panic]
    fn test_pop_empty_panics() {
        let mut queue: PriorityQueue<f32> = PriorityQueue::new();
        queue.pop();
    }

    #[test]
    #[should_panic]
    fn test_duplicate_push_panics() {
        let mut queue = PriorityQueue::new();
        queue.push(1, 1.0);
        queue.push(1, 2.0);
    }

    #[test]
    fn test_random_operations_keep_heap_valid() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let mut queue = PriorityQueue::new();

        for _ in 0..2000 {
            let item = rng.random_range(0..128);
            let priority: f32 = rng.random_range(0.0..100.0);
            match rng.random_range(0..4) {
                0 | 1 => {
                    if !queue.update_priority(item, priority) {
                        queue.push(item, priority);
                    }
                }
                2 => {
                    queue.remove(item);
                }
                _ => {
                    if let Some((_, popped)) = queue.try_pop() {
                        assert!(queue.iter().all(|(_, p)| p >= popped));
                    }
                }
            }
            assert!(queue.is_valid());
        }
    }
}
