//! Timer heap for deadline-ordered callbacks.
//!
//! A min-heap of callbacks keyed by virtual-time deadline. Entries inserted
//! at the same deadline fire in insertion order via a generation tiebreak.

use crate::driver::Callback;
use crate::types::Time;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct TimerEntry {
    deadline: Time,
    /// Generation keeps same-deadline entries in insertion order.
    generation: u64,
    callback: Callback,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of callbacks ordered by deadline.
#[derive(Default)]
pub struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

impl TimerHeap {
    /// Creates a new empty timer heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of timers in the heap.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if the heap is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Adds a callback firing at the given deadline.
    pub fn insert(&mut self, deadline: Time, callback: Callback) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.heap.push(TimerEntry {
            deadline,
            generation,
            callback,
        });
    }

    /// Pops the earliest timer, returning its deadline and callback.
    pub fn pop_earliest(&mut self) -> Option<(Time, Callback)> {
        self.heap.pop().map(|e| (e.deadline, e.callback))
    }
}
