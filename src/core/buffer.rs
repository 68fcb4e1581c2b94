//! Bounded sliding windows of recent events.
//!
//! Each session keeps the most recent N keyboard and mouse events for feature
//! extraction. Oldest entries are evicted on overflow; insertion order is
//! preserved.

use std::collections::VecDeque;

/// Default window size shared by keyboard and mouse buffers.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// A bounded FIFO of the most recent events.
#[derive(Debug, Clone)]
pub struct EventBuffer<T> {
    capacity: usize,
    events: VecDeque<T>,
}

impl<T: Clone> EventBuffer<T> {
    /// Create a buffer holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Append an event, evicting the oldest entry once the buffer is full.
    pub fn push(&mut self, event: T) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// The most recent `k` events (or fewer), oldest first. Does not mutate.
    pub fn snapshot(&self, k: usize) -> Vec<T> {
        let skip = self.events.len().saturating_sub(k);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<T: Clone> Default for EventBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
