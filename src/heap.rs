//! Deadline min-heap.
//!
//! `std::collections::BinaryHeap` has no way to remove an arbitrary element
//! in better than O(n), and a request can complete via a path other than
//! its own deadline firing ("remove this request from the heap by its
//! stored index" whenever that happens). This is a small indexed binary
//! heap: a `Vec` ordered as a heap plus a side table from request id to its
//! current slot, kept in sync on every swap during sift-up/down — each
//! entry effectively carries its own array index back into the request it
//! represents, just keyed by id instead of an embedded pointer field, since
//! nothing in this crate holds a raw pointer into a request.

use std::collections::HashMap;
use std::time::Instant;

struct Entry {
    deadline: Instant,
    req_id: u64,
}

pub(crate) struct DeadlineHeap {
    entries: Vec<Entry>,
    index: HashMap<u64, usize>,
}

impl DeadlineHeap {
    pub(crate) fn new() -> DeadlineHeap {
        DeadlineHeap {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn peek_deadline(&self) -> Option<Instant> {
        self.entries.first().map(|e| e.deadline)
    }

    pub(crate) fn push(&mut self, req_id: u64, deadline: Instant) {
        let idx = self.entries.len();
        self.entries.push(Entry { deadline, req_id });
        self.index.insert(req_id, idx);
        self.sift_up(idx);
    }

    /// Removes `req_id` from the heap if present. O(log n).
    pub(crate) fn remove(&mut self, req_id: u64) {
        let Some(&idx) = self.index.get(&req_id) else {
            return;
        };
        self.remove_at(idx);
    }

    /// Pops every entry whose deadline has already elapsed (`<= now`), in
    /// heap-pop order. Ties between equal deadlines are broken by
    /// whichever order the heap happens to pop them in; completion order
    /// within a single firing is not otherwise specified.
    pub(crate) fn drain_expired(&mut self, now: Instant) -> Vec<u64> {
        let mut expired = Vec::new();
        while let Some(top) = self.entries.first() {
            if top.deadline > now {
                break;
            }
            expired.push(self.pop_root());
        }
        expired
    }

    fn pop_root(&mut self) -> u64 {
        let root_id = self.entries[0].req_id;
        self.remove_at(0);
        root_id
    }

    fn remove_at(&mut self, idx: usize) -> u64 {
        let last = self.entries.len() - 1;
        self.swap(idx, last);
        let removed = self.entries.pop().expect("index in bounds");
        self.index.remove(&removed.req_id);
        if idx < self.entries.len() {
            // The element swapped into `idx` may need to move either way.
            self.sift_down(idx);
            self.sift_up(idx);
        }
        removed.req_id
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.index.insert(self.entries[a].req_id, a);
        self.index.insert(self.entries[b].req_id, b);
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.entries[idx].deadline < self.entries[parent].deadline {
                self.swap(idx, parent);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;
            if left < len && self.entries[left].deadline < self.entries[smallest].deadline {
                smallest = left;
            }
            if right < len && self.entries[right].deadline < self.entries[smallest].deadline {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn pops_in_deadline_order() {
        let base = Instant::now();
        let mut heap = DeadlineHeap::new();
        heap.push(1, base + Duration::from_millis(30));
        heap.push(2, base + Duration::from_millis(10));
        heap.push(3, base + Duration::from_millis(20));

        let expired = heap.drain_expired(base + Duration::from_millis(25));
        assert_eq!(expired, vec![2, 3]);
        assert!(!heap.is_empty());
        assert_eq!(
            heap.drain_expired(base + Duration::from_millis(30)),
            vec![1]
        );
        assert!(heap.is_empty());
    }

    #[test]
    fn remove_from_middle() {
        let base = Instant::now();
        let mut heap = DeadlineHeap::new();
        for id in 0..10u64 {
            heap.push(id, base + Duration::from_millis(id * 5));
        }
        heap.remove(4);
        heap.remove(0);
        let expired = heap.drain_expired(base + Duration::from_millis(100));
        assert_eq!(expired.len(), 8);
        assert!(!expired.contains(&4));
        assert!(!expired.contains(&0));
    }
}
