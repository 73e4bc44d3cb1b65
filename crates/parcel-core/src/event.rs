//! Engine event log with a pre-allocated ring buffer.
//!
//! The engine records notable happenings (unlocks, effect starts and
//! expiries, entity pops, loot drops) as they occur. Passive listeners see
//! each event immediately; the display layer drains the buffer at its own
//! pace. When the buffer is full the oldest events are dropped.

use crate::id::*;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    AchievementUnlocked { id: AchievementId, express_reward: u64 },
    BuffStarted { id: BuffId },
    BuffExpired { id: BuffId },
    EventStarted { id: EventId },
    EventExpired { id: EventId },
    EntitySpawned { id: WrinklerId },
    EntityPopped { id: WrinklerId, released: f64 },
    LootDropped { id: LootId },
    Ascended { level: u64, gained: u64 },
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type PassiveListener = Box<dyn FnMut(&EngineEvent)>;

pub struct EventLog {
    events: Vec<Option<EngineEvent>>,
    /// Write position (wraps around).
    head: usize,
    len: usize,
    total_written: u64,
    listeners: Vec<PassiveListener>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .field("total_written", &self.total_written)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventLog {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
            listeners: Vec::new(),
        }
    }

    pub fn on_event(&mut self, listener: PassiveListener) {
        self.listeners.push(listener);
    }

    /// Record an event and notify listeners.
    pub fn push(&mut self, event: EngineEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
        let cap = self.capacity();
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % cap;
        if self.len < cap {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Number of events lost to overflow.
    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity() as u64)
    }

    fn oldest_index(&self) -> usize {
        if self.len < self.capacity() { 0 } else { self.head }
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &EngineEvent> {
        let start = self.oldest_index();
        let cap = self.capacity();
        (0..self.len).filter_map(move |i| self.events[(start + i) % cap].as_ref())
    }

    /// Take every buffered event, oldest first.
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        let start = self.oldest_index();
        let cap = self.capacity();
        let out = (0..self.len)
            .filter_map(|i| self.events[(start + i) % cap].take())
            .collect();
        self.head = 0;
        self.len = 0;
        out
    }
}
