//! Bounded Event Buffer
//!
//! Drop-oldest FIFO of recent market events. Evicting at capacity is the
//! normal steady state, not an error.

use std::collections::{BTreeMap, VecDeque};

use super::streaming::{FrequencyKind, MarketEvent};

/// Bounded FIFO of [`MarketEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: VecDeque<MarketEvent>,
    capacity: usize,
    evicted: u64,
}

impl EventBuffer {
    /// Create a buffer holding at most `capacity` events (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append an event, returning the evicted oldest event when full.
    pub fn push(&mut self, event: MarketEvent) -> Option<MarketEvent> {
        let evicted = if self.events.len() >= self.capacity {
            self.evicted += 1;
            self.events.pop_front()
        } else {
            None
        };
        self.events.push_back(event);
        evicted
    }

    /// Take every buffered event, oldest first.
    pub fn drain(&mut self) -> Vec<MarketEvent> {
        self.events.drain(..).collect()
    }

    /// Discard every buffered event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of events held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total events evicted since creation.
    #[must_use]
    pub const fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Buffered events grouped by frequency, computed from the single FIFO.
    #[must_use]
    pub fn by_frequency(&self) -> BTreeMap<FrequencyKind, Vec<MarketEvent>> {
        let mut grouped: BTreeMap<FrequencyKind, Vec<MarketEvent>> = BTreeMap::new();
        for event in &self.events {
            grouped.entry(event.frequency).or_default().push(event.clone());
        }
        grouped
    }
}
