use std::{cmp::Ordering, collections::BinaryHeap, fmt};

/// A payload waiting for its fire time.
struct PendingCallback<T> {
    /// time (since boot) at which the payload becomes due
    fire_time_ms: u64,
    /// insertion counter, breaks ties FIFO
    seq: u64,
    payload: T,
}

impl<T> PartialEq for PendingCallback<T> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time_ms == other.fire_time_ms && self.seq == other.seq
    }
}

impl<T> Eq for PendingCallback<T> {}

impl<T> PartialOrd for PendingCallback<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PendingCallback<T> {
    // reversed: BinaryHeap is a max-heap and we want the earliest entry on top
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_time_ms
            .cmp(&self.fire_time_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Ordered collection of pending `(fire time, payload)` pairs.
///
/// Entries come out in ascending fire time. Entries sharing a fire time come
/// out in the order they were pushed.
pub struct DelayedCallbackQueue<T> {
    entries: BinaryHeap<PendingCallback<T>>,
    next_seq: u64,
}

impl<T> DelayedCallbackQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, fire_time_ms: u64, payload: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(PendingCallback {
            fire_time_ms,
            seq,
            payload,
        });
    }

    /// Removes and returns the earliest entry if it is due at `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<T> {
        match self.entries.peek() {
            Some(top) if top.fire_time_ms <= now_ms => {
                self.entries.pop().map(|entry| entry.payload)
            }
            _ => None,
        }
    }

    /// Removes every entry due at `now_ms`, earliest first.
    pub fn drain_due(&mut self, now_ms: u64) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(payload) = self.pop_due(now_ms) {
            due.push(payload);
        }
        due
    }

    pub fn next_fire_time(&self) -> Option<u64> {
        self.entries.peek().map(|entry| entry.fire_time_ms)
    }

    /// Keeps only the entries for which `keep` returns true. Returns how many
    /// were removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|entry| keep(&entry.payload));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for DelayedCallbackQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DelayedCallbackQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedCallbackQueue")
            .field("len", &self.entries.len())
            .field("next_fire_time", &self.next_fire_time())
            .finish()
    }
}
