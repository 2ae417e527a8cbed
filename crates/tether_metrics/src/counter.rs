//! Per-runtime event counters

use crate::event::{BridgeEvent, CounterSnapshot};
use std::cell::Cell;

/// Counters for one script runtime.
///
/// A runtime is confined to a single thread, so plain `Cell`s are enough.
pub struct Counter {
    counts: [Cell<u64>; BridgeEvent::COUNT],
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counts: Default::default(),
        }
    }

    pub fn increment(&self, event: BridgeEvent) {
        self.add(event, 1);
    }

    pub fn add(&self, event: BridgeEvent, value: u64) {
        let cell = &self.counts[event.index()];
        cell.set(cell.get().saturating_add(value));
    }

    pub fn get(&self, event: BridgeEvent) -> u64 {
        self.counts[event.index()].get()
    }

    pub fn reset_all(&self) {
        for cell in &self.counts {
            cell.set(0);
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let mut counts = [0; BridgeEvent::COUNT];
        for (slot, cell) in counts.iter_mut().zip(&self.counts) {
            *slot = cell.get();
        }
        CounterSnapshot::from_counts(counts)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_snapshot() {
        let counter = Counter::new();
        counter.increment(BridgeEvent::JobRun);
        counter.add(BridgeEvent::JobRun, 2);
        counter.increment(BridgeEvent::TimerFired);

        let snapshot = counter.snapshot();
        assert_eq!(snapshot.get(BridgeEvent::JobRun), 3);
        assert_eq!(snapshot.get(BridgeEvent::TimerFired), 1);
        assert_eq!(snapshot.get(BridgeEvent::TrampolineCall), 0);

        counter.reset_all();
        assert_eq!(counter.get(BridgeEvent::JobRun), 0);
    }
}
