//! Scheduled occurrences and the queue which orders them.

use std::{cmp::Ordering, collections::BTreeMap};

use crate::{block::BlockId, miner::MinerId};

/// Something which will happen to a miner at a future point in simulated
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The miner's attempt to extend `parent` succeeds. Stale if the miner
    /// has switched to another tip in the meantime.
    Mined { miner: MinerId, parent: BlockId },
    /// A block relayed by a peer arrives at the miner.
    Received { miner: MinerId, block: BlockId },
}

impl Event {
    /// The miner this event happens to.
    pub fn miner(&self) -> MinerId {
        match *self {
            Event::Mined { miner, .. } | Event::Received { miner, .. } => miner,
        }
    }
}

/// Key for ordering events in the queue.
///
/// Events are ordered by time (earlier first), then by sequence number, so
/// events scheduled for the same instant pop in the order they were
/// scheduled.
#[derive(Debug, Clone, Copy)]
struct EventKey {
    time: f64,
    sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.total_cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }

        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventKey {}

/// Min-priority queue of [`Event`]s keyed by simulated time.
///
/// Events are never cancelled; the only way out of the queue is
/// [`EventQueue::pop_earliest`].
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: BTreeMap<EventKey, Event>,
    /// Sequence counter for deterministic ordering.
    sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `event` to happen at `time`.
    pub fn schedule(&mut self, time: f64, event: Event) {
        debug_assert!(!time.is_nan(), "event scheduled at NaN");

        let key = EventKey { time, sequence: self.sequence };
        self.sequence += 1;
        self.events.insert(key, event);
    }

    /// Removes and returns the earliest scheduled event along with its time.
    pub fn pop_earliest(&mut self) -> Option<(f64, Event)> {
        self.events.pop_first().map(|(key, event)| (key.time, event))
    }

    /// Time of the earliest scheduled event.
    pub fn peek_time(&self) -> Option<f64> {
        self.events.first_key_value().map(|(key, _)| key.time)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
