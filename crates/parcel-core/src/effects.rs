//! Time-limited effects and the collection mechanic.
//!
//! Buffs and world events share one lifecycle: spawned with
//! `remaining_ms = total_ms`, ticked down by elapsed time, removed on the
//! same decay call that takes them to zero or below. An id already running
//! is refreshed in place, so list ids stay unique.
//!
//! The collector spawns wrinkler-style entities that skim a share of every
//! passive tick and hand it back, with a bonus, when popped.

use crate::config::{CollectorConfig, EventSpawnConfig};
use crate::id::{BuffId, EventId, WrinklerId};
use crate::registry::{BuffDef, Catalog, EventDef};
use crate::rng::SimRng;
use crate::state::{ActiveEvent, Buff, Store, Wrinkler};

// ---------------------------------------------------------------------------
// Buffs and events
// ---------------------------------------------------------------------------

/// Start (or refresh) a buff. Returns `true` when the id was new.
pub fn spawn_buff(buffs: &mut Vec<Buff>, def: &BuffDef) -> bool {
    if let Some(existing) = buffs.iter_mut().find(|b| b.id == def.id) {
        existing.kind = def.kind;
        existing.multiplier = def.multiplier;
        existing.remaining_ms = def.duration_ms;
        existing.total_ms = def.duration_ms;
        return false;
    }
    buffs.push(Buff {
        id: def.id.clone(),
        kind: def.kind,
        multiplier: def.multiplier,
        remaining_ms: def.duration_ms,
        total_ms: def.duration_ms,
    });
    true
}

/// Start (or refresh) a world event. Returns `true` when the id was new.
pub fn spawn_event(events: &mut Vec<ActiveEvent>, def: &EventDef) -> bool {
    if let Some(existing) = events.iter_mut().find(|e| e.id == def.id) {
        existing.kind = def.kind.clone();
        existing.multiplier = def.multiplier;
        existing.remaining_ms = def.duration_ms;
        existing.total_ms = def.duration_ms;
        return false;
    }
    events.push(ActiveEvent {
        id: def.id.clone(),
        kind: def.kind.clone(),
        multiplier: def.multiplier,
        remaining_ms: def.duration_ms,
        total_ms: def.duration_ms,
    });
    true
}

/// Ids removed by one decay pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecayReport {
    pub expired_buffs: Vec<BuffId>,
    pub expired_events: Vec<EventId>,
}

impl DecayReport {
    pub fn is_empty(&self) -> bool {
        self.expired_buffs.is_empty() && self.expired_events.is_empty()
    }
}

/// Subtract `elapsed_ms` from every buff and drop the expired ones.
pub fn decay_buffs(buffs: &mut Vec<Buff>, elapsed_ms: f64) -> Vec<BuffId> {
    let mut expired = Vec::new();
    buffs.retain_mut(|b| {
        b.remaining_ms -= elapsed_ms;
        if b.remaining_ms <= 0.0 {
            expired.push(b.id.clone());
            false
        } else {
            true
        }
    });
    expired
}

/// Subtract `elapsed_ms` from every event and drop the expired ones.
pub fn decay_events(events: &mut Vec<ActiveEvent>, elapsed_ms: f64) -> Vec<EventId> {
    let mut expired = Vec::new();
    events.retain_mut(|e| {
        e.remaining_ms -= elapsed_ms;
        if e.remaining_ms <= 0.0 {
            expired.push(e.id.clone());
            false
        } else {
            true
        }
    });
    expired
}

/// Decay both lists in the store. Writes only the lists that had entries.
pub fn decay(store: &mut Store, elapsed_ms: f64) -> DecayReport {
    let mut report = DecayReport::default();
    let state = store.state();
    if !state.active_buffs.is_empty() {
        let mut buffs = state.active_buffs.clone();
        report.expired_buffs = decay_buffs(&mut buffs, elapsed_ms);
        store.replace_buffs(buffs);
    }
    let state = store.state();
    if !state.active_events.is_empty() {
        let mut events = state.active_events.clone();
        report.expired_events = decay_events(&mut events, elapsed_ms);
        store.replace_events(events);
    }
    report
}

// ---------------------------------------------------------------------------
// Event spawner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EventSpawner {
    config: EventSpawnConfig,
}

impl EventSpawner {
    pub fn new(config: EventSpawnConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EventSpawnConfig {
        &self.config
    }

    /// One spawn opportunity: roll the chance, then pick a definition by
    /// weight.
    pub fn roll<'c>(&self, rng: &mut SimRng, catalog: &'c Catalog) -> Option<&'c EventDef> {
        if catalog.events().is_empty() || !rng.chance(self.config.spawn_chance) {
            return None;
        }
        let weights: Vec<u32> = catalog.events().iter().map(|e| e.weight).collect();
        rng.pick_weighted(&weights).map(|i| &catalog.events()[i])
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Result of one passive tick through the collector.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorTick {
    /// Yield left for the player after diversion.
    pub net_yield: f64,
    pub diverted: f64,
    pub spawned: Option<WrinklerId>,
}

#[derive(Debug, Clone)]
pub struct Collector {
    config: CollectorConfig,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Maybe spawn an entity, then divert `divert_fraction` of `tick_yield`
    /// into each live entity. Total diversion never exceeds the yield.
    pub fn tick(&self, store: &mut Store, rng: &mut SimRng, tick_yield: f64, now_ms: u64) -> CollectorTick {
        let mut spawned = None;
        if store.state().wrinklers.len() < self.config.max_entities && rng.chance(self.config.spawn_chance) {
            spawned = Some(store.spawn_wrinkler(Wrinkler {
                accumulated: 0.0,
                spawned_at_ms: now_ms,
            }));
        }

        let live = store.state().wrinklers.len();
        if live == 0 || tick_yield <= 0.0 {
            return CollectorTick {
                net_yield: tick_yield.max(0.0),
                diverted: 0.0,
                spawned,
            };
        }
        let fraction = (self.config.divert_fraction * live as f64).min(1.0);
        let diverted = tick_yield * fraction;
        store.feed_wrinklers(diverted / live as f64);
        CollectorTick {
            net_yield: tick_yield - diverted,
            diverted,
            spawned,
        }
    }

    /// Remove the entity and return `accumulated × pop_bonus`. `None` for a
    /// stale or unknown id.
    pub fn pop(&self, store: &mut Store, id: WrinklerId) -> Option<f64> {
        let w = store.remove_wrinkler(id)?;
        Some(w.accumulated * self.config.pop_bonus)
    }
}
