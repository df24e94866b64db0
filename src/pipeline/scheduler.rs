//! Bounded `queued -> in-flight -> done` task queues.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Observed peaks of a [`TaskQueue`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueMarks {
    /// Largest number of tasks ever in flight at once.
    pub max_in_flight: usize,
    /// Longest the waiting queue has been.
    pub max_queued: usize,
    /// Tasks completed so far.
    pub completed: u64,
}

/// FIFO of unique keys with an in-flight cap.
#[derive(Clone, Debug)]
pub struct TaskQueue<K> {
    cap: usize,
    queued: VecDeque<K>,
    queued_set: HashSet<K>,
    in_flight: HashSet<K>,
    marks: QueueMarks,
}

impl<K: Copy + Eq + Hash> TaskQueue<K> {
    /// Create a queue allowing `cap` tasks in flight.
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            queued: VecDeque::new(),
            queued_set: HashSet::new(),
            in_flight: HashSet::new(),
            marks: QueueMarks::default(),
        }
    }

    /// Queue `key` unless it is already queued or in flight. Returns `true` when added.
    pub fn enqueue(&mut self, key: K) -> bool {
        if self.in_flight.contains(&key) || !self.queued_set.insert(key) {
            return false;
        }
        self.queued.push_back(key);
        self.marks.max_queued = self.marks.max_queued.max(self.queued.len());
        true
    }

    /// Move keys from the front of the queue into flight while under the cap.
    pub fn start_batch(&mut self) -> Vec<K> {
        let mut started = Vec::new();
        while self.in_flight.len() < self.cap {
            let Some(key) = self.queued.pop_front() else {
                break;
            };
            self.queued_set.remove(&key);
            self.in_flight.insert(key);
            started.push(key);
        }
        self.marks.max_in_flight = self.marks.max_in_flight.max(self.in_flight.len());
        started
    }

    /// Mark `key` done, freeing its slot. Returns `false` if it was not in flight.
    pub fn complete(&mut self, key: K) -> bool {
        let done = self.in_flight.remove(&key);
        if done {
            self.marks.completed += 1;
        }
        done
    }

    /// Drop `key` from the waiting queue.
    pub fn cancel(&mut self, key: K) -> bool {
        if self.queued_set.remove(&key) {
            self.queued.retain(|k| *k != key);
            true
        } else {
            false
        }
    }

    /// Return `true` when `key` is queued or in flight.
    pub fn contains(&self, key: &K) -> bool {
        self.queued_set.contains(key) || self.in_flight.contains(key)
    }

    /// Return `true` when `key` is in flight.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.contains(key)
    }

    /// Tasks waiting for a slot.
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Tasks holding a slot.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// In-flight cap.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Return `true` when nothing is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.queued.is_empty() && self.in_flight.is_empty()
    }

    /// Peaks observed so far.
    pub fn marks(&self) -> QueueMarks {
        self.marks
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/scheduler.rs"]
mod tests;
