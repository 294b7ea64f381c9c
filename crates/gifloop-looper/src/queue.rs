//! Deadline-ordered pending queue
//!
//! Entries are ordered by `(scheduled_at, seq)` ascending. `seq` is assigned
//! on push, so entries with equal deadlines come out in push order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

struct Entry<T> {
    scheduled_at: Instant,
    seq: u64,
    item: T,
}

// Reverse ordering for min-heap (earliest deadline, then lowest seq, first)
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_at
            .cmp(&self.scheduled_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.scheduled_at == other.scheduled_at && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

/// Pending items waiting for their deadline
pub(crate) struct PendingQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> PendingQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Insert an item; returns true if it became the earliest entry
    pub(crate) fn push(&mut self, item: T, scheduled_at: Instant) -> bool {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            scheduled_at,
            seq,
            item,
        });
        self.heap.peek().map(|head| head.seq) == Some(seq)
    }

    /// Deadline of the earliest entry
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.scheduled_at)
    }

    /// Pop the earliest entry if its deadline is not after `now`
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<T> {
        match self.heap.peek() {
            Some(entry) if entry.scheduled_at <= now => self.heap.pop().map(|entry| entry.item),
            _ => None,
        }
    }

    /// Remove every item matching `pred`, returning them so the caller can
    /// drop them outside any lock
    pub(crate) fn remove_matching<P>(&mut self, mut pred: P) -> Vec<T>
    where
        P: FnMut(&T) -> bool,
    {
        let mut kept = BinaryHeap::with_capacity(self.heap.len());
        let mut removed = Vec::new();
        for entry in self.heap.drain() {
            if pred(&entry.item) {
                removed.push(entry.item);
            } else {
                kept.push(entry);
            }
        }
        self.heap = kept;
        removed
    }

    /// Remove everything
    pub(crate) fn take_all(&mut self) -> Vec<T> {
        self.heap.drain().map(|entry| entry.item).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
