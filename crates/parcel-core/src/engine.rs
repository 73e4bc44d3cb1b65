//! The action/tick orchestrator.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - A [`Store`] holding the canonical [`GameState`]
//! - The frozen [`Catalog`] and a [`ContributorRegistry`]
//! - A [`PendingUpdates`] buffer for deferred deltas
//! - An [`AchievementEvaluator`], a [`Collector`] and an [`EventSpawner`]
//! - A [`Scheduler`] for the periodic drivers, a [`SimRng`] and a [`Clock`]
//! - An [`EventLog`] for the display layer
//!
//! # Cycle
//!
//! Player actions run synchronously. Clicks and passive income only push
//! into the pending buffer; purchases write immediately and mark the buffer
//! dirty. Each [`Engine::advance`] fires the due drivers and then flushes
//! once, applying in order:
//! 1. **Packages** -- one absolute balance write
//! 2. **Earned** -- run and all-time counters
//! 3. **Clicked** -- clicked packages and click count
//! 4. **Production** -- PPS recompute if dirty
//! 5. **Achievements** -- full check if dirty, throttled check otherwise
//!
//! Flushing needs `&mut self`, so it can never re-enter itself.

use std::sync::Arc;

use tracing::{debug, info};

use crate::achievement::AchievementEvaluator;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::effects::{self, Collector, EventSpawner};
use crate::event::{EngineEvent, EventLog, PassiveListener};
use crate::id::*;
use crate::multiplier::{Contributor, ContributorContext, ContributorRegistry};
use crate::pending::{PendingUpdate, PendingUpdates};
use crate::registry::{Catalog, UpgradeEffect};
use crate::rng::SimRng;
use crate::scheduler::{Driver, Scheduler};
use crate::state::{GameState, RareLoot, Settings, Store, StoreError};

// ---------------------------------------------------------------------------
// Errors and reports
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ActionError {
    #[error("unknown building: {0}")]
    UnknownBuilding(BuildingId),
    #[error("unknown upgrade: {0}")]
    UnknownUpgrade(UpgradeId),
    #[error("unknown heavenly upgrade: {0}")]
    UnknownHeavenly(HeavenlyId),
    #[error("unknown research: {0}")]
    UnknownResearch(ResearchId),
    #[error("unknown buff: {0}")]
    UnknownBuff(BuffId),
    #[error("insufficient funds: price {price}, available {available}")]
    InsufficientFunds { price: f64, available: f64 },
    #[error("already owned: {0}")]
    AlreadyOwned(String),
    #[error("requires {count} x {building}")]
    Locked { building: BuildingId, count: u32 },
    #[error("ascending now would not raise prestige level {current}")]
    NothingToGain { current: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a flush wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    pub wrote_packages: bool,
    pub pps_recomputed: bool,
    pub newly_unlocked: Vec<AchievementId>,
}

/// Prestige level reached with `total` all-time earnings.
pub fn prestige_level_for(total: f64, divisor: f64) -> u64 {
    if total <= 0.0 || divisor <= 0.0 {
        return 0;
    }
    (total / divisor).cbrt().floor() as u64
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Engine {
    catalog: Arc<Catalog>,
    config: EngineConfig,
    store: Store,
    contributors: ContributorRegistry,
    pending: PendingUpdates,
    evaluator: AchievementEvaluator,
    collector: Collector,
    spawner: EventSpawner,
    scheduler: Scheduler,
    rng: SimRng,
    clock: Box<dyn Clock>,
    events: EventLog,
    last_click_ms: Option<u64>,
}

impl Engine {
    /// Engine on the wall clock.
    pub fn new(catalog: Arc<Catalog>, config: EngineConfig) -> Self {
        Self::with_clock(catalog, config, Box::new(SystemClock))
    }

    pub fn with_clock(catalog: Arc<Catalog>, config: EngineConfig, clock: Box<dyn Clock>) -> Self {
        let mut store = Store::new(&catalog);
        store.set_last_tick_time(clock.now_ms());
        let mut engine = Self {
            contributors: ContributorRegistry::with_builtins(),
            pending: PendingUpdates::new(),
            evaluator: AchievementEvaluator::new(config.evaluator.clone()),
            collector: Collector::new(config.collector.clone()),
            spawner: EventSpawner::new(config.events.clone()),
            scheduler: Scheduler::new(),
            rng: SimRng::new(config.seed),
            events: EventLog::default(),
            last_click_ms: None,
            catalog,
            config,
            store,
            clock,
        };
        for driver in [Driver::PassiveIncome, Driver::EffectDecay, Driver::EventSpawn] {
            engine.start_driver(driver);
        }
        engine
    }

    // -- Accessors --

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &GameState {
        self.store.state()
    }

    /// Owned point-in-time copy of the canonical state.
    pub fn snapshot(&self) -> GameState {
        self.store.snapshot()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn pending(&self) -> &PendingUpdates {
        &self.pending
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn on_event(&mut self, listener: PassiveListener) {
        self.events.on_event(listener);
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain()
    }

    fn ctx(&self) -> ContributorContext<'_> {
        self.contributors
            .context(self.store.state(), &self.catalog, &self.config)
    }

    // -- Queries --

    pub fn effective_pps(&self) -> f64 {
        self.contributors.effective_pps(&self.ctx())
    }

    pub fn effective_click_value(&self) -> f64 {
        self.contributors.effective_click_value(&self.ctx())
    }

    /// Current value of one global contributor.
    pub fn contributor_value(&self, contributor: &Contributor) -> f64 {
        contributor.query(&self.ctx())
    }

    pub fn building_price(&self, id: &BuildingId) -> Option<f64> {
        self.contributors.building_price(&self.ctx(), id)
    }

    /// Canonical balance plus the unflushed pending delta.
    pub fn affordable_packages(&self) -> f64 {
        self.store.state().packages + self.pending.packages_delta()
    }

    pub fn can_afford(&self, id: &BuildingId) -> bool {
        self.building_price(id)
            .is_some_and(|price| self.affordable_packages() >= price)
    }

    pub fn achievement_progress(&mut self, id: &AchievementId) -> Option<f64> {
        let now = self.clock.now_ms();
        self.evaluator
            .progress(id, now, &self.catalog, self.store.state())
    }

    pub fn unlocked_count(&self) -> usize {
        self.store.state().achievements_unlocked.len()
    }

    /// Prestige levels an ascension would add right now.
    pub fn pending_ascension_levels(&self) -> u64 {
        let state = self.store.state();
        let total = state.prestige.total_earned_all_time + self.pending.peek().earned_delta;
        prestige_level_for(total, self.config.ascension_divisor).saturating_sub(state.prestige.level)
    }

    // -- Contributors --

    /// Set a host-supplied production factor (weather, stocks, staff).
    pub fn set_external_factor(&mut self, name: &str, factor: f64) {
        self.contributors.set_external(name, factor);
        self.pending.push(PendingUpdate::PpsDirty);
    }

    pub fn clear_external_factor(&mut self, name: &str) {
        self.contributors.clear_external(name);
        self.pending.push(PendingUpdate::PpsDirty);
    }

    // -- Actions --

    /// Accept a click unless it lands inside the debounce window. Returns the
    /// deferred click value, or `None` when dropped.
    pub fn click(&mut self) -> Option<f64> {
        let now = self.clock.now_ms();
        if let Some(last) = self.last_click_ms {
            if now.saturating_sub(last) < self.config.click_debounce_ms {
                debug!(since_last = now.saturating_sub(last), "click debounced");
                return None;
            }
        }
        self.last_click_ms = Some(now);
        let value = self.effective_click_value();
        self.pending.push(PendingUpdate::Click { value });
        self.roll_loot();
        Some(value)
    }

    fn roll_loot(&mut self) {
        if !self.rng.chance(self.config.loot.drop_chance) {
            return;
        }
        let owned = &self.store.state().rare_loot;
        let candidates: Vec<_> = self
            .catalog
            .loot_table()
            .iter()
            .filter(|l| !owned.iter().any(|o| o.id == l.id))
            .collect();
        let weights: Vec<u32> = candidates.iter().map(|l| l.weight).collect();
        let Some(i) = self.rng.pick_weighted(&weights) else {
            return;
        };
        let def = candidates[i];
        let loot = RareLoot {
            id: def.id.clone(),
            production_bonus: def.production_bonus,
            discount: def.discount,
        };
        debug!(loot = %loot.id, "rare loot dropped");
        self.events.push(EngineEvent::LootDropped { id: loot.id.clone() });
        self.store.push_rare_loot(loot);
        self.pending.push(PendingUpdate::PpsDirty);
    }

    /// Deduct `price` from the canonical balance, borrowing from the pending
    /// delta when the canonical balance alone is short.
    fn pay(&mut self, price: f64) -> Result<(), ActionError> {
        let available = self.affordable_packages();
        if available < price {
            return Err(ActionError::InsufficientFunds { price, available });
        }
        let canonical = self.store.state().packages;
        if canonical >= price {
            self.store.set_packages(canonical - price);
        } else {
            self.store.set_packages(0.0);
            self.pending.push(PendingUpdate::Spend {
                amount: price - canonical,
            });
        }
        Ok(())
    }

    /// Buy one unit of a building. Returns the price paid.
    pub fn try_buy_building(&mut self, id: &BuildingId) -> Result<f64, ActionError> {
        let price = self
            .building_price(id)
            .ok_or_else(|| ActionError::UnknownBuilding(id.clone()))?;
        self.pay(price)?;
        let count = self.store.state().building_count(id);
        self.store.set_building_count(id, count + 1)?;
        self.store.add_buildings_bought(1);
        self.pending.push(PendingUpdate::PpsDirty);
        self.pending.push(PendingUpdate::AchievementsDirty);
        debug!(building = %id, price, count = count + 1, "bought building");
        Ok(price)
    }

    pub fn buy_building(&mut self, id: &BuildingId) -> bool {
        self.try_buy_building(id).is_ok()
    }

    pub fn try_purchase_upgrade(&mut self, id: &UpgradeId) -> Result<(), ActionError> {
        let catalog = Arc::clone(&self.catalog);
        let def = catalog
            .upgrade(id)
            .ok_or_else(|| ActionError::UnknownUpgrade(id.clone()))?;
        if self.store.state().purchased_upgrades.contains(id) {
            return Err(ActionError::AlreadyOwned(id.to_string()));
        }
        if let Some(req) = &def.requires {
            if self.store.state().building_count(&req.building) < req.count {
                return Err(ActionError::Locked {
                    building: req.building.clone(),
                    count: req.count,
                });
            }
        }
        self.pay(def.cost)?;
        self.store.insert_upgrade(id.clone());
        if let UpgradeEffect::ClickAdd(n) = def.effect {
            let ppc = self.store.state().packages_per_click;
            self.store.set_packages_per_click(ppc + n);
        }
        self.pending.push(PendingUpdate::PpsDirty);
        self.pending.push(PendingUpdate::AchievementsDirty);
        debug!(upgrade = %id, cost = def.cost, "purchased upgrade");
        Ok(())
    }

    pub fn purchase_upgrade(&mut self, id: &UpgradeId) -> bool {
        self.try_purchase_upgrade(id).is_ok()
    }

    /// Spend prestige points on a heavenly upgrade.
    pub fn try_purchase_heavenly(&mut self, id: &HeavenlyId) -> Result<(), ActionError> {
        let cost = self
            .catalog
            .heavenly(id)
            .ok_or_else(|| ActionError::UnknownHeavenly(id.clone()))?
            .cost_points;
        if self.store.state().prestige.heavenly_upgrades.contains(id) {
            return Err(ActionError::AlreadyOwned(id.to_string()));
        }
        self.store.spend_prestige_points(cost)?;
        self.store.update_prestige(|p| {
            p.heavenly_upgrades.insert(id.clone());
        });
        self.pending.push(PendingUpdate::PpsDirty);
        debug!(heavenly = %id, cost, "purchased heavenly upgrade");
        Ok(())
    }

    pub fn purchase_heavenly(&mut self, id: &HeavenlyId) -> bool {
        self.try_purchase_heavenly(id).is_ok()
    }

    /// Spend express points on a research node.
    pub fn try_purchase_research(&mut self, id: &ResearchId) -> Result<(), ActionError> {
        let cost = self
            .catalog
            .research(id)
            .ok_or_else(|| ActionError::UnknownResearch(id.clone()))?
            .cost_express;
        if self.store.state().research_completed.contains(id) {
            return Err(ActionError::AlreadyOwned(id.to_string()));
        }
        self.store.spend_express_points(cost)?;
        self.store.insert_research(id.clone());
        self.pending.push(PendingUpdate::PpsDirty);
        debug!(research = %id, cost, "completed research");
        Ok(())
    }

    pub fn purchase_research(&mut self, id: &ResearchId) -> bool {
        self.try_purchase_research(id).is_ok()
    }

    /// Start a catalog buff, or refresh it if already running.
    pub fn try_activate_buff(&mut self, id: &BuffId) -> Result<(), ActionError> {
        let catalog = Arc::clone(&self.catalog);
        let def = catalog
            .buff(id)
            .ok_or_else(|| ActionError::UnknownBuff(id.clone()))?;
        let mut buffs = self.store.state().active_buffs.clone();
        effects::spawn_buff(&mut buffs, def);
        self.store.replace_buffs(buffs);
        self.events.push(EngineEvent::BuffStarted { id: id.clone() });
        self.pending.push(PendingUpdate::PpsDirty);
        debug!(buff = %id, duration_ms = def.duration_ms, "buff started");
        Ok(())
    }

    pub fn activate_buff(&mut self, id: &BuffId) -> bool {
        self.try_activate_buff(id).is_ok()
    }

    /// Pop a collection entity, releasing its hoard (with bonus) through
    /// the pending buffer. `None` for a stale or unknown id.
    pub fn pop_entity(&mut self, id: WrinklerId) -> Option<f64> {
        let released = self.collector.pop(&mut self.store, id)?;
        self.store.add_wrinklers_popped(1);
        self.pending.push(PendingUpdate::Earn { amount: released });
        self.pending.push(PendingUpdate::AchievementsDirty);
        self.events.push(EngineEvent::EntityPopped { id, released });
        debug!(released, "entity popped");
        Some(released)
    }

    /// Pop every live entity; returns the total released.
    pub fn pop_all_entities(&mut self) -> f64 {
        self.store
            .state()
            .wrinklers
            .ids()
            .into_iter()
            .filter_map(|id| self.pop_entity(id))
            .sum()
    }

    /// Convert all-time earnings into prestige levels and start a new run.
    pub fn try_ascend(&mut self) -> Result<u64, ActionError> {
        self.flush_pending_updates();
        let prestige = &self.store.state().prestige;
        let current = prestige.level;
        let level = prestige_level_for(prestige.total_earned_all_time, self.config.ascension_divisor);
        if level <= current {
            return Err(ActionError::NothingToGain { current });
        }
        let gained = level - current;
        self.store.update_prestige(|p| {
            p.points += gained;
            p.level = level;
            p.times_ascended += 1;
        });
        self.store.ascend_reset(&self.catalog);
        self.pending.discard();
        self.evaluator.invalidate();
        self.last_click_ms = None;
        self.recompute_pps();
        self.pending.push(PendingUpdate::AchievementsDirty);
        self.events.push(EngineEvent::Ascended { level, gained });
        info!(level, gained, "ascended");
        Ok(gained)
    }

    pub fn ascend(&mut self) -> bool {
        self.try_ascend().is_ok()
    }

    /// New game. Prestige is lost too.
    pub fn reset(&mut self) {
        self.store.reset(&self.catalog);
        self.pending.discard();
        self.evaluator.invalidate();
        self.last_click_ms = None;
        let now = self.clock.now_ms();
        self.store.set_last_tick_time(now);
        info!("game reset");
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.store.set_settings(settings);
    }

    /// Swap in a loaded state: drops pending deltas and caches, recomputes
    /// production and reconciles achievements.
    pub fn load_state(&mut self, state: GameState) {
        self.store.replace(state);
        self.pending.discard();
        self.evaluator.invalidate();
        self.last_click_ms = None;
        self.recompute_pps();
        let now = self.clock.now_ms();
        let newly = self
            .evaluator
            .check_now(now, &self.catalog, self.store.state());
        self.apply_unlocks(newly);
    }

    /// Stamp the last save time.
    pub(crate) fn mark_saved(&mut self, now_ms: u64) {
        self.store.set_last_save_time(now_ms);
    }

    // -- Drivers --

    fn driver_period(&self, driver: Driver) -> u64 {
        match driver {
            Driver::PassiveIncome => self.config.tick_ms.max(1),
            Driver::EffectDecay => 0,
            Driver::EventSpawn => self.config.events.interval_ms.max(1),
        }
    }

    /// Schedule a driver if it is not running.
    pub fn start_driver(&mut self, driver: Driver) -> TimerId {
        if let Some(id) = self.scheduler.timer_for(driver) {
            return id;
        }
        let period = self.driver_period(driver);
        self.scheduler.schedule(driver, period)
    }

    /// Cancel a driver's timer. Accumulated time toward its next firing is
    /// dropped.
    pub fn stop_driver(&mut self, driver: Driver) -> bool {
        self.scheduler.cancel_driver(driver)
    }

    /// One passive-income tick.
    pub fn generate_passive_income(&mut self) {
        self.run_passive_ticks(1);
    }

    fn run_passive_ticks(&mut self, count: u64) {
        let tick_yield = self.effective_pps() * self.config.tick_ms as f64 / 1000.0;
        let now = self.clock.now_ms();
        for _ in 0..count {
            let tick = self
                .collector
                .tick(&mut self.store, &mut self.rng, tick_yield, now);
            if let Some(id) = tick.spawned {
                self.events.push(EngineEvent::EntitySpawned { id });
            }
            if tick.net_yield > 0.0 {
                self.pending.push(PendingUpdate::Earn {
                    amount: tick.net_yield,
                });
            }
            if self.rng.chance(self.config.passive_achievement_chance) {
                self.pending.push(PendingUpdate::AchievementsDirty);
            }
        }
    }

    /// Tick every buff and event down by `elapsed_ms`.
    pub fn decay_effects(&mut self, elapsed_ms: f64) {
        let report = effects::decay(&mut self.store, elapsed_ms);
        if report.is_empty() {
            return;
        }
        for id in report.expired_buffs {
            debug!(buff = %id, "buff expired");
            self.events.push(EngineEvent::BuffExpired { id });
        }
        for id in report.expired_events {
            debug!(event = %id, "event expired");
            self.events.push(EngineEvent::EventExpired { id });
        }
        self.pending.push(PendingUpdate::PpsDirty);
    }

    fn spawn_events(&mut self, opportunities: u64) {
        let catalog = Arc::clone(&self.catalog);
        for _ in 0..opportunities {
            let Some(def) = self.spawner.roll(&mut self.rng, &catalog) else {
                continue;
            };
            let mut events = self.store.state().active_events.clone();
            effects::spawn_event(&mut events, def);
            self.store.replace_events(events);
            self.events.push(EngineEvent::EventStarted { id: def.id.clone() });
            self.pending.push(PendingUpdate::PpsDirty);
            debug!(event = %def.id, "world event started");
        }
    }

    /// The scheduler loop: fire due drivers, account play time, flush once.
    pub fn advance(&mut self, delta_ms: u64) -> FlushReport {
        for firing in self.scheduler.advance(delta_ms) {
            match firing.driver {
                Driver::PassiveIncome => self.run_passive_ticks(firing.count),
                Driver::EffectDecay => self.decay_effects(firing.elapsed_ms as f64),
                Driver::EventSpawn => self.spawn_events(firing.count),
            }
        }
        if delta_ms > 0 {
            self.store.add_play_time(delta_ms);
        }
        let now = self.clock.now_ms();
        self.store.set_last_tick_time(now);
        self.flush_pending_updates()
    }

    // -- Flush --

    fn recompute_pps(&mut self) -> f64 {
        let pps = self.effective_pps();
        self.store.set_pps(pps);
        pps
    }

    fn apply_unlocks(&mut self, newly: Vec<AchievementId>) -> Vec<AchievementId> {
        let added = self.store.unlock_achievements(newly);
        let mut reward = 0;
        for id in &added {
            let express_reward = self.catalog.achievement(id).map_or(0, |a| a.express_reward);
            reward += express_reward;
            info!(achievement = %id, express_reward, "achievement unlocked");
            self.events.push(EngineEvent::AchievementUnlocked {
                id: id.clone(),
                express_reward,
            });
        }
        self.store.add_express_points(reward);
        if !added.is_empty() {
            // Unlock count feeds the achievement production bonus.
            self.recompute_pps();
        }
        added
    }

    /// Apply the pending buffer. A no-op when the buffer is empty.
    pub fn flush_pending_updates(&mut self) -> FlushReport {
        if self.pending.is_empty() {
            return FlushReport::default();
        }
        let batch = self.pending.drain();
        let mut report = FlushReport::default();

        if batch.packages_delta != 0.0 {
            let packages = self.store.state().packages + batch.packages_delta;
            self.store.set_packages(packages);
            report.wrote_packages = true;
        }
        self.store.add_total_earned(batch.earned_delta);
        self.store.add_total_earned_all_time(batch.earned_delta);
        self.store.add_total_clicked(batch.clicked_delta);
        self.store.add_clicks(batch.clicks);

        if batch.pps_dirty {
            self.recompute_pps();
            report.pps_recomputed = true;
        }

        let now = self.clock.now_ms();
        let newly = if batch.achievements_dirty {
            Some(
                self.evaluator
                    .check_now(now, &self.catalog, self.store.state()),
            )
        } else {
            self.evaluator
                .maybe_check(now, &mut self.rng, &self.catalog, self.store.state())
        };
        if let Some(newly) = newly {
            report.newly_unlocked = self.apply_unlocks(newly);
            report.pps_recomputed |= !report.newly_unlocked.is_empty();
        }
        report
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::state::StoreField;
    use crate::test_utils::*;

    fn courier() -> BuildingId {
        BuildingId::from("courier")
    }

    // -----------------------------------------------------------------------
    // Clicking and flushing
    // -----------------------------------------------------------------------

    #[test]
    fn fifty_clicks_flush_as_one_write_per_field() {
        let (mut engine, clock) = test_engine();
        let before_packages = engine.store().write_count(StoreField::Packages);
        let before_clicked = engine.store().write_count(StoreField::TotalPackagesClicked);
        let mut sum = 0.0;
        for _ in 0..50 {
            clock.advance(60);
            sum += engine.click().unwrap();
        }
        assert_eq!(engine.state().packages, 0.0);

        let report = engine.flush_pending_updates();
        assert!(report.wrote_packages);
        assert_eq!(engine.state().packages, sum);
        assert_eq!(engine.state().total_packages_clicked, sum);
        assert_eq!(engine.state().total_clicks, 50);
        assert_eq!(engine.store().write_count(StoreField::Packages) - before_packages, 1);
        assert_eq!(
            engine.store().write_count(StoreField::TotalPackagesClicked) - before_clicked,
            1
        );
    }

    #[test]
    fn click_inside_debounce_window_is_dropped() {
        let (mut engine, clock) = test_engine();
        assert!(engine.click().is_some());
        clock.advance(49);
        assert!(engine.click().is_none());
        engine.flush_pending_updates();
        assert_eq!(engine.state().total_clicks, 1);
        clock.advance(1);
        assert!(engine.click().is_some());
    }

    #[test]
    fn empty_flush_is_noop() {
        let (mut engine, _clock) = test_engine();
        let rev = engine.store().revision();
        assert_eq!(engine.flush_pending_updates(), FlushReport::default());
        assert_eq!(engine.store().revision(), rev);
    }

    #[test]
    fn first_flush_checks_achievements() {
        let (mut engine, _clock) = test_engine();
        engine.click();
        engine.flush_pending_updates();
        // The first flush always runs a full check.
        assert!(engine.state().achievements_unlocked.contains(&AchievementId::from("click_1")));
        assert!(engine.state().express_points >= 1);
    }

    #[test]
    fn unlocking_flush_leaves_buffer_empty() {
        let (mut engine, _clock) = test_engine();
        engine.click();
        let report = engine.flush_pending_updates();
        assert!(report.newly_unlocked.contains(&AchievementId::from("click_1")));
        assert!(report.pps_recomputed);
        assert!(engine.pending().is_empty());
        assert_eq!(engine.state().packages_per_second, engine.effective_pps());
    }

    // -----------------------------------------------------------------------
    // Purchasing
    // -----------------------------------------------------------------------

    #[test]
    fn buy_building_deducts_price_and_increments_count() {
        let (mut engine, _clock) = test_engine_with_packages(100.0);
        assert_eq!(engine.building_price(&courier()), Some(15.0));
        assert!(engine.buy_building(&courier()));
        assert_eq!(engine.state().packages, 85.0);
        assert_eq!(engine.state().building_count(&courier()), 1);
        assert_eq!(engine.building_price(&courier()), Some(17.0));
        assert!(engine.pending().peek().pps_dirty);
        assert!(engine.pending().peek().achievements_dirty);
    }

    #[test]
    fn insufficient_funds_changes_nothing() {
        let (mut engine, _clock) = test_engine_with_packages(10.0);
        let rev = engine.store().revision();
        assert_eq!(
            engine.try_buy_building(&courier()),
            Err(ActionError::InsufficientFunds {
                price: 15.0,
                available: 10.0
            })
        );
        assert!(!engine.can_afford(&courier()));
        assert_eq!(engine.store().revision(), rev);
    }

    #[test]
    fn unknown_building_is_false_not_panic() {
        let (mut engine, _clock) = test_engine_with_packages(1e9);
        assert!(!engine.buy_building(&BuildingId::from("teleporter")));
        assert_eq!(engine.building_price(&BuildingId::from("teleporter")), None);
    }

    #[test]
    fn purchase_counts_unflushed_clicks() {
        let (mut engine, clock) = test_engine_with_packages(10.0);
        for _ in 0..5 {
            clock.advance(60);
            engine.click();
        }
        assert_eq!(engine.affordable_packages(), 15.0);
        assert!(engine.buy_building(&courier()));
        assert_eq!(engine.state().packages, 0.0);
        engine.flush_pending_updates();
        assert_eq!(engine.state().packages, 0.0);
        assert_eq!(engine.state().total_packages_clicked, 5.0);
    }

    #[test]
    fn upgrade_requires_building_and_is_bought_once() {
        let (mut engine, _clock) = test_engine_with_packages(1000.0);
        let training = UpgradeId::from("courier_training");
        assert!(matches!(
            engine.try_purchase_upgrade(&training),
            Err(ActionError::Locked { .. })
        ));
        engine.buy_building(&courier());
        engine.try_purchase_upgrade(&training).unwrap();
        assert_eq!(
            engine.try_purchase_upgrade(&training),
            Err(ActionError::AlreadyOwned("courier_training".into()))
        );
        engine.flush_pending_updates();
        assert!((engine.state().packages_per_second - 0.2).abs() < 1e-9);
    }

    #[test]
    fn click_add_upgrade_raises_base_click() {
        let (mut engine, _clock) = test_engine_with_packages(1000.0);
        engine.try_purchase_upgrade(&UpgradeId::from("reinforced_gloves")).unwrap();
        assert_eq!(engine.state().packages_per_click, 2.0);
        assert_eq!(engine.effective_click_value(), 2.0);
    }

    #[test]
    fn research_spends_express_points() {
        let (mut engine, _clock) = test_engine();
        let id = ResearchId::from("route_optimization");
        assert!(matches!(
            engine.try_purchase_research(&id),
            Err(ActionError::Store(StoreError::InsufficientExpress { .. }))
        ));
        let mut state = engine.snapshot();
        state.express_points = 10;
        engine.load_state(state);
        engine.try_purchase_research(&id).unwrap();
        assert_eq!(engine.state().express_points, 5);
        assert_eq!(engine.contributor_value(&Contributor::Research), 1.2);
    }

    // -----------------------------------------------------------------------
    // Passive income and drivers
    // -----------------------------------------------------------------------

    #[test]
    fn advance_pays_passive_income() {
        let (mut engine, clock) = test_engine_with_packages(1000.0);
        for _ in 0..10 {
            engine.buy_building(&courier());
        }
        engine.flush_pending_updates();
        let before = engine.state().packages;
        // 10 couriers -> 1 pps.
        clock.advance(1000);
        engine.advance(1000);
        assert!((engine.state().packages - before - 1.0).abs() < 1e-9);
        assert_eq!(engine.state().total_play_time, 1000);
    }

    #[test]
    fn stopped_driver_does_not_fire_until_restarted() {
        let (mut engine, _clock) = test_engine_with_packages(15.0);
        engine.buy_building(&courier());
        engine.flush_pending_updates();
        assert!(engine.stop_driver(Driver::PassiveIncome));
        assert!(!engine.stop_driver(Driver::PassiveIncome));
        engine.advance(10_000);
        assert_eq!(engine.state().packages, 0.0);
        engine.start_driver(Driver::PassiveIncome);
        engine.advance(1000);
        assert!(engine.state().packages > 0.0);
    }

    #[test]
    fn buff_expires_through_advance() {
        let (mut engine, _clock) = test_engine();
        engine.activate_buff(&BuffId::from("frenzy"));
        let total = engine.state().active_buffs[0].total_ms as u64;
        engine.advance(total - 1);
        assert_eq!(engine.state().active_buffs.len(), 1);
        engine.advance(1);
        assert!(engine.state().active_buffs.is_empty());
        let expired = engine
            .drain_events()
            .into_iter()
            .any(|e| e == EngineEvent::BuffExpired { id: BuffId::from("frenzy") });
        assert!(expired);
    }

    #[test]
    fn unknown_buff_rejected() {
        let (mut engine, _clock) = test_engine();
        assert!(!engine.activate_buff(&BuffId::from("nope")));
    }

    // -----------------------------------------------------------------------
    // Collection entities
    // -----------------------------------------------------------------------

    #[test]
    fn popping_releases_bonus_and_is_idempotent() {
        let catalog = Arc::new(sample_catalog());
        let mut config = quiet_config();
        config.collector.spawn_chance = 1.0;
        config.collector.max_entities = 1;
        let clock = ManualClock::new(0);
        let mut engine = Engine::with_clock(catalog, config, Box::new(clock.clone()));
        let mut state = engine.snapshot();
        state.buildings.get_mut(&courier()).unwrap().count = 100;
        engine.load_state(state);

        engine.advance(1000);
        let id = engine.state().wrinklers.ids()[0];
        let hoard = engine.state().wrinklers.get(id).unwrap().accumulated;
        assert!(hoard > 0.0);
        let released = engine.pop_entity(id).unwrap();
        assert!((released - hoard * 1.1).abs() < 1e-9);
        assert!(engine.pop_entity(id).is_none());
        assert_eq!(engine.state().wrinklers_popped, 1);
    }

    // -----------------------------------------------------------------------
    // Ascension and reset
    // -----------------------------------------------------------------------

    #[test]
    fn prestige_level_is_cube_root() {
        assert_eq!(prestige_level_for(0.0, 1e12), 0);
        assert_eq!(prestige_level_for(1e12, 1e12), 1);
        assert_eq!(prestige_level_for(8e12, 1e12), 2);
        assert_eq!(prestige_level_for(26.9e12, 1e12), 2);
    }

    #[test]
    fn ascend_without_gain_fails() {
        let (mut engine, _clock) = test_engine();
        assert_eq!(engine.try_ascend(), Err(ActionError::NothingToGain { current: 0 }));
    }

    #[test]
    fn ascend_keeps_prestige_and_clears_run() {
        let (mut engine, _clock) = test_engine_with_packages(1e6);
        engine.buy_building(&courier());
        let mut state = engine.snapshot();
        state.prestige.total_earned_all_time = 8e12;
        state.achievements_unlocked.insert(AchievementId::from("click_1"));
        engine.load_state(state);
        assert_eq!(engine.pending_ascension_levels(), 2);

        assert_eq!(engine.try_ascend(), Ok(2));
        let s = engine.state();
        assert_eq!(s.prestige.level, 2);
        assert_eq!(s.prestige.points, 2);
        assert_eq!(s.prestige.times_ascended, 1);
        assert_eq!(s.packages, 0.0);
        assert_eq!(s.building_count(&courier()), 0);
        assert!(s.achievements_unlocked.contains(&AchievementId::from("click_1")));
        assert!((engine.contributor_value(&Contributor::Prestige) - 1.02).abs() < 1e-12);
    }

    #[test]
    fn heavenly_upgrade_costs_points() {
        let (mut engine, _clock) = test_engine();
        let wings = HeavenlyId::from("angel_wings");
        assert!(!engine.purchase_heavenly(&wings));
        let mut state = engine.snapshot();
        state.prestige.points = 1;
        engine.load_state(state);
        assert!(engine.purchase_heavenly(&wings));
        assert_eq!(engine.state().prestige.points, 0);
        assert!(!engine.purchase_heavenly(&wings));
    }

    #[test]
    fn reset_returns_to_default() {
        let (mut engine, clock) = test_engine_with_packages(100.0);
        engine.buy_building(&courier());
        clock.advance(100);
        engine.click();
        engine.reset();
        assert!(engine.pending().is_empty());
        assert_eq!(engine.state().packages, 0.0);
        assert_eq!(engine.state().building_count(&courier()), 0);
    }

    // -----------------------------------------------------------------------
    // External contributors
    // -----------------------------------------------------------------------

    #[test]
    fn external_factor_scales_production() {
        let (mut engine, _clock) = test_engine_with_packages(15.0);
        engine.buy_building(&courier());
        let base = engine.effective_pps();
        engine.set_external_factor("weather", 1.5);
        assert!((engine.effective_pps() - base * 1.5).abs() < 1e-12);
        assert_eq!(
            engine.contributor_value(&Contributor::External("stocks".into())),
            1.0
        );
    }
}
