//! The canonical game-state record and the store that owns it.
//!
//! [`Store`] is the only writer of [`GameState`]. Every mutation goes through a
//! named operation that bumps the store revision and the write counter of the
//! field it touched, so callers can observe exactly how many writes a batch of
//! actions produced. No operation here performs pricing or multiplier math.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::id::*;
use crate::registry::{BuffKind, Catalog, EventKind};

// ---------------------------------------------------------------------------
// State types
// ---------------------------------------------------------------------------

/// Owned count and copied base stats for one catalog building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingState {
    pub count: u32,
    pub base_price: f64,
    pub base_pps: f64,
}

/// Prestige tier. Survives ascension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Prestige {
    pub level: u64,
    /// Unspent heavenly currency.
    pub points: u64,
    pub total_earned_all_time: f64,
    pub heavenly_upgrades: BTreeSet<HeavenlyId>,
    pub times_ascended: u32,
}

/// A running buff instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buff {
    pub id: BuffId,
    pub kind: BuffKind,
    pub multiplier: f64,
    pub remaining_ms: f64,
    pub total_ms: f64,
}

/// A running world event instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEvent {
    pub id: EventId,
    pub kind: EventKind,
    pub multiplier: f64,
    pub remaining_ms: f64,
    pub total_ms: f64,
}

/// A live collection entity skimming production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wrinkler {
    pub accumulated: f64,
    pub spawned_at_ms: u64,
}

/// Live collection entities keyed by generational id, so a popped id
/// never aliases a later spawn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wrinklers(SlotMap<WrinklerId, Wrinkler>);

impl Wrinklers {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: WrinklerId) -> Option<&Wrinkler> {
        self.0.get(id)
    }

    pub fn ids(&self) -> Vec<WrinklerId> {
        self.0.keys().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WrinklerId, &Wrinkler)> {
        self.0.iter()
    }

    pub fn total_accumulated(&self) -> f64 {
        self.0.values().map(|w| w.accumulated).sum()
    }
}

impl PartialEq for Wrinklers {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

/// An owned rare loot item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RareLoot {
    pub id: LootId,
    pub production_bonus: f64,
    pub discount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub autosave: bool,
    pub notifications: bool,
    pub number_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            autosave: true,
            notifications: true,
            number_format: "short".to_string(),
        }
    }
}

/// The single mutable aggregate of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub packages: f64,
    /// Cached effective production; recomputed by the engine.
    pub packages_per_second: f64,
    /// Base click value before multipliers.
    pub packages_per_click: f64,
    pub buildings: BTreeMap<BuildingId, BuildingState>,
    pub purchased_upgrades: BTreeSet<UpgradeId>,
    pub achievements_unlocked: BTreeSet<AchievementId>,
    pub prestige: Prestige,
    pub active_buffs: Vec<Buff>,
    pub active_events: Vec<ActiveEvent>,
    pub express_points: u64,
    pub total_express_points_earned: u64,
    pub rare_loot: Vec<RareLoot>,
    pub wrinklers: Wrinklers,
    pub settings: Settings,
    pub last_tick_time: u64,
    pub last_save_time: u64,
    pub total_play_time: u64,
    pub total_packages_earned: f64,
    pub total_packages_clicked: f64,
    pub total_clicks: u64,
    pub wrinklers_popped: u64,
    pub research_completed: BTreeSet<ResearchId>,
    pub buildings_bought_total: u64,
}

impl GameState {
    /// Fresh state with one zero-count entry per catalog building.
    pub fn new(catalog: &Catalog) -> Self {
        let buildings = catalog
            .buildings()
            .iter()
            .map(|b| {
                (
                    b.id.clone(),
                    BuildingState {
                        count: 0,
                        base_price: b.base_price,
                        base_pps: b.base_pps,
                    },
                )
            })
            .collect();
        Self {
            packages: 0.0,
            packages_per_second: 0.0,
            packages_per_click: 1.0,
            buildings,
            purchased_upgrades: BTreeSet::new(),
            achievements_unlocked: BTreeSet::new(),
            prestige: Prestige::default(),
            active_buffs: Vec::new(),
            active_events: Vec::new(),
            express_points: 0,
            total_express_points_earned: 0,
            rare_loot: Vec::new(),
            wrinklers: Wrinklers::default(),
            settings: Settings::default(),
            last_tick_time: 0,
            last_save_time: 0,
            total_play_time: 0,
            total_packages_earned: 0.0,
            total_packages_clicked: 0.0,
            total_clicks: 0,
            wrinklers_popped: 0,
            research_completed: BTreeSet::new(),
            buildings_bought_total: 0,
        }
    }

    pub fn building_count(&self, id: &BuildingId) -> u32 {
        self.buildings.get(id).map_or(0, |b| b.count)
    }

    pub fn total_buildings(&self) -> u64 {
        self.buildings.values().map(|b| b.count as u64).sum()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StoreError {
    #[error("invalid building type: {0}")]
    InvalidBuildingType(BuildingId),
    #[error("insufficient express points: need {needed}, have {available}")]
    InsufficientExpress { needed: u64, available: u64 },
    #[error("insufficient prestige points: need {needed}, have {available}")]
    InsufficientPoints { needed: u64, available: u64 },
}

/// Fields whose writes are counted individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreField {
    Packages,
    PackagesPerSecond,
    PackagesPerClick,
    Buildings,
    PurchasedUpgrades,
    AchievementsUnlocked,
    Prestige,
    ActiveBuffs,
    ActiveEvents,
    Express,
    RareLoot,
    Wrinklers,
    Settings,
    Bookkeeping,
    TotalPackagesEarned,
    TotalPackagesClicked,
    TotalClicks,
    WrinklersPopped,
    ResearchCompleted,
    Whole,
}

const FIELD_COUNT: usize = 20;

impl StoreField {
    fn index(self) -> usize {
        self as usize
    }
}

/// Sole owner of the canonical [`GameState`].
#[derive(Debug, Clone)]
pub struct Store {
    state: GameState,
    revision: u64,
    writes: [u64; FIELD_COUNT],
}

impl Store {
    pub fn new(catalog: &Catalog) -> Self {
        Self::from_state(GameState::new(catalog))
    }

    pub fn from_state(state: GameState) -> Self {
        Self {
            state,
            revision: 0,
            writes: [0; FIELD_COUNT],
        }
    }

    /// Read-only view. Writes need `&mut self`, so a view is always a
    /// consistent point in time.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Owned point-in-time copy.
    pub fn snapshot(&self) -> GameState {
        self.state.clone()
    }

    /// Incremented by every successful mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of writes applied to `field` since the store was created.
    pub fn write_count(&self, field: StoreField) -> u64 {
        self.writes[field.index()]
    }

    fn touch(&mut self, field: StoreField) {
        self.revision += 1;
        self.writes[field.index()] += 1;
    }

    // -- Scalars --

    pub fn set_packages(&mut self, value: f64) {
        self.state.packages = value.max(0.0);
        self.touch(StoreField::Packages);
    }

    pub fn set_pps(&mut self, value: f64) {
        self.state.packages_per_second = value;
        self.touch(StoreField::PackagesPerSecond);
    }

    pub fn set_packages_per_click(&mut self, value: f64) {
        self.state.packages_per_click = value;
        self.touch(StoreField::PackagesPerClick);
    }

    /// Adds to the run's earned counter. Negative deltas are ignored so the
    /// counter stays monotonic.
    pub fn add_total_earned(&mut self, delta: f64) {
        if delta > 0.0 {
            self.state.total_packages_earned += delta;
            self.touch(StoreField::TotalPackagesEarned);
        }
    }

    pub fn add_total_earned_all_time(&mut self, delta: f64) {
        if delta > 0.0 {
            self.state.prestige.total_earned_all_time += delta;
            self.touch(StoreField::Prestige);
        }
    }

    pub fn add_total_clicked(&mut self, delta: f64) {
        if delta > 0.0 {
            self.state.total_packages_clicked += delta;
            self.touch(StoreField::TotalPackagesClicked);
        }
    }

    pub fn add_clicks(&mut self, n: u64) {
        if n > 0 {
            self.state.total_clicks += n;
            self.touch(StoreField::TotalClicks);
        }
    }

    // -- Buildings --

    /// Overwrite a building's count. Fails for ids absent from the state.
    pub fn set_building_count(&mut self, id: &BuildingId, count: u32) -> Result<(), StoreError> {
        let entry = self
            .state
            .buildings
            .get_mut(id)
            .ok_or_else(|| StoreError::InvalidBuildingType(id.clone()))?;
        entry.count = count;
        self.touch(StoreField::Buildings);
        Ok(())
    }

    /// Replace a whole building record. Fails for ids absent from the state.
    pub fn replace_building(&mut self, id: &BuildingId, record: BuildingState) -> Result<(), StoreError> {
        let entry = self
            .state
            .buildings
            .get_mut(id)
            .ok_or_else(|| StoreError::InvalidBuildingType(id.clone()))?;
        *entry = record;
        self.touch(StoreField::Buildings);
        Ok(())
    }

    pub fn add_buildings_bought(&mut self, n: u64) {
        self.state.buildings_bought_total += n;
        self.touch(StoreField::Buildings);
    }

    // -- Sets --

    /// Returns `false` if the upgrade was already owned.
    pub fn insert_upgrade(&mut self, id: UpgradeId) -> bool {
        let added = self.state.purchased_upgrades.insert(id);
        if added {
            self.touch(StoreField::PurchasedUpgrades);
        }
        added
    }

    /// Adds every id not already unlocked in a single write; returns the ids
    /// that were new.
    pub fn unlock_achievements<I>(&mut self, ids: I) -> Vec<AchievementId>
    where
        I: IntoIterator<Item = AchievementId>,
    {
        let mut added = Vec::new();
        for id in ids {
            if self.state.achievements_unlocked.insert(id.clone()) {
                added.push(id);
            }
        }
        if !added.is_empty() {
            self.touch(StoreField::AchievementsUnlocked);
        }
        added
    }

    pub fn insert_research(&mut self, id: ResearchId) -> bool {
        let added = self.state.research_completed.insert(id);
        if added {
            self.touch(StoreField::ResearchCompleted);
        }
        added
    }

    // -- Prestige --

    pub fn update_prestige<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Prestige),
    {
        f(&mut self.state.prestige);
        self.touch(StoreField::Prestige);
    }

    pub fn spend_prestige_points(&mut self, cost: u64) -> Result<(), StoreError> {
        let available = self.state.prestige.points;
        if available < cost {
            return Err(StoreError::InsufficientPoints {
                needed: cost,
                available,
            });
        }
        self.state.prestige.points -= cost;
        self.touch(StoreField::Prestige);
        Ok(())
    }

    // -- Express points --

    pub fn add_express_points(&mut self, n: u64) {
        if n > 0 {
            self.state.express_points += n;
            self.state.total_express_points_earned += n;
            self.touch(StoreField::Express);
        }
    }

    pub fn spend_express_points(&mut self, cost: u64) -> Result<(), StoreError> {
        let available = self.state.express_points;
        if available < cost {
            return Err(StoreError::InsufficientExpress {
                needed: cost,
                available,
            });
        }
        self.state.express_points -= cost;
        self.touch(StoreField::Express);
        Ok(())
    }

    // -- Lists --

    pub fn replace_buffs(&mut self, buffs: Vec<Buff>) {
        self.state.active_buffs = buffs;
        self.touch(StoreField::ActiveBuffs);
    }

    pub fn replace_events(&mut self, events: Vec<ActiveEvent>) {
        self.state.active_events = events;
        self.touch(StoreField::ActiveEvents);
    }

    pub fn push_rare_loot(&mut self, loot: RareLoot) {
        self.state.rare_loot.push(loot);
        self.touch(StoreField::RareLoot);
    }

    // -- Collection entities --

    pub fn spawn_wrinkler(&mut self, wrinkler: Wrinkler) -> WrinklerId {
        let id = self.state.wrinklers.0.insert(wrinkler);
        self.touch(StoreField::Wrinklers);
        id
    }

    /// Removes the entity. `None` for an unknown or already-removed id.
    pub fn remove_wrinkler(&mut self, id: WrinklerId) -> Option<Wrinkler> {
        let removed = self.state.wrinklers.0.remove(id)?;
        self.touch(StoreField::Wrinklers);
        Some(removed)
    }

    /// Adds `amount` to every live entity's hoard.
    pub fn feed_wrinklers(&mut self, amount: f64) {
        if self.state.wrinklers.is_empty() || amount <= 0.0 {
            return;
        }
        for w in self.state.wrinklers.0.values_mut() {
            w.accumulated += amount;
        }
        self.touch(StoreField::Wrinklers);
    }

    pub fn add_wrinklers_popped(&mut self, n: u64) {
        self.state.wrinklers_popped += n;
        self.touch(StoreField::WrinklersPopped);
    }

    // -- Bookkeeping --

    pub fn set_settings(&mut self, settings: Settings) {
        self.state.settings = settings;
        self.touch(StoreField::Settings);
    }

    pub fn set_last_tick_time(&mut self, now_ms: u64) {
        self.state.last_tick_time = now_ms;
        self.touch(StoreField::Bookkeeping);
    }

    pub fn set_last_save_time(&mut self, now_ms: u64) {
        self.state.last_save_time = now_ms;
        self.touch(StoreField::Bookkeeping);
    }

    pub fn add_play_time(&mut self, ms: u64) {
        self.state.total_play_time += ms;
        self.touch(StoreField::Bookkeeping);
    }

    // -- Whole-state replacement --

    /// Swap in a state produced elsewhere (load, import).
    pub fn replace(&mut self, state: GameState) {
        self.state = state;
        self.touch(StoreField::Whole);
    }

    /// New game.
    pub fn reset(&mut self, catalog: &Catalog) {
        self.replace(GameState::new(catalog));
    }

    /// Partial reset keeping prestige, achievements, express points,
    /// research, owned loot, settings and play time.
    pub fn ascend_reset(&mut self, catalog: &Catalog) {
        let old = std::mem::replace(&mut self.state, GameState::new(catalog));
        let s = &mut self.state;
        s.prestige = old.prestige;
        s.achievements_unlocked = old.achievements_unlocked;
        s.express_points = old.express_points;
        s.total_express_points_earned = old.total_express_points_earned;
        s.research_completed = old.research_completed;
        s.rare_loot = old.rare_loot;
        s.settings = old.settings;
        s.total_play_time = old.total_play_time;
        s.last_tick_time = old.last_tick_time;
        s.last_save_time = old.last_save_time;
        self.touch(StoreField::Whole);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_catalog;

    fn courier() -> BuildingId {
        BuildingId::from("courier")
    }

    #[test]
    fn new_state_has_one_entry_per_building() {
        let catalog = sample_catalog();
        let store = Store::new(&catalog);
        assert_eq!(store.state().buildings.len(), catalog.building_count());
        assert_eq!(store.state().building_count(&courier()), 0);
        assert_eq!(store.state().packages_per_click, 1.0);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn unknown_building_rejected_without_write() {
        let catalog = sample_catalog();
        let mut store = Store::new(&catalog);
        let err = store
            .set_building_count(&BuildingId::from("teleporter"), 3)
            .unwrap_err();
        assert_eq!(err, StoreError::InvalidBuildingType(BuildingId::from("teleporter")));
        assert_eq!(store.revision(), 0);
        assert!(!store.state().buildings.contains_key(&BuildingId::from("teleporter")));
    }

    #[test]
    fn writes_are_counted_per_field() {
        let catalog = sample_catalog();
        let mut store = Store::new(&catalog);
        store.set_packages(10.0);
        store.set_packages(20.0);
        store.add_total_clicked(5.0);
        assert_eq!(store.write_count(StoreField::Packages), 2);
        assert_eq!(store.write_count(StoreField::TotalPackagesClicked), 1);
        assert_eq!(store.write_count(StoreField::Buildings), 0);
        assert_eq!(store.revision(), 3);
    }

    #[test]
    fn counters_ignore_negative_deltas() {
        let catalog = sample_catalog();
        let mut store = Store::new(&catalog);
        store.add_total_earned(10.0);
        store.add_total_earned(-4.0);
        assert_eq!(store.state().total_packages_earned, 10.0);
        assert_eq!(store.write_count(StoreField::TotalPackagesEarned), 1);
    }

    #[test]
    fn packages_never_negative() {
        let catalog = sample_catalog();
        let mut store = Store::new(&catalog);
        store.set_packages(-5.0);
        assert_eq!(store.state().packages, 0.0);
    }

    #[test]
    fn unlock_reports_only_new_ids() {
        let catalog = sample_catalog();
        let mut store = Store::new(&catalog);
        let first = store.unlock_achievements([AchievementId::from("click_1")]);
        assert_eq!(first.len(), 1);
        let second = store.unlock_achievements([
            AchievementId::from("click_1"),
            AchievementId::from("click_100"),
        ]);
        assert_eq!(second, vec![AchievementId::from("click_100")]);
        assert_eq!(store.write_count(StoreField::AchievementsUnlocked), 2);
    }

    #[test]
    fn wrinkler_remove_twice_is_noop() {
        let catalog = sample_catalog();
        let mut store = Store::new(&catalog);
        let id = store.spawn_wrinkler(Wrinkler {
            accumulated: 0.0,
            spawned_at_ms: 0,
        });
        store.feed_wrinklers(3.0);
        assert_eq!(store.remove_wrinkler(id).unwrap().accumulated, 3.0);
        assert!(store.remove_wrinkler(id).is_none());
    }

    #[test]
    fn spending_more_than_available_fails() {
        let catalog = sample_catalog();
        let mut store = Store::new(&catalog);
        store.add_express_points(5);
        assert!(store.spend_express_points(6).is_err());
        store.spend_express_points(5).unwrap();
        assert_eq!(store.state().express_points, 0);
        assert_eq!(store.state().total_express_points_earned, 5);
    }

    #[test]
    fn ascend_reset_preserves_prestige_subset() {
        let catalog = sample_catalog();
        let mut store = Store::new(&catalog);
        store.set_packages(1e6);
        store.set_building_count(&courier(), 12).unwrap();
        store.insert_upgrade(UpgradeId::from("courier_training"));
        store.unlock_achievements([AchievementId::from("click_1")]);
        store.update_prestige(|p| {
            p.level = 3;
            p.points = 3;
        });
        store.add_express_points(7);
        store.add_play_time(5000);

        store.ascend_reset(&catalog);
        let s = store.state();
        assert_eq!(s.packages, 0.0);
        assert_eq!(s.building_count(&courier()), 0);
        assert!(s.purchased_upgrades.is_empty());
        assert!(s.achievements_unlocked.contains(&AchievementId::from("click_1")));
        assert_eq!(s.prestige.level, 3);
        assert_eq!(s.express_points, 7);
        assert_eq!(s.total_play_time, 5000);
    }

    #[test]
    fn reset_replaces_everything() {
        let catalog = sample_catalog();
        let mut store = Store::new(&catalog);
        store.update_prestige(|p| p.level = 9);
        store.reset(&catalog);
        assert_eq!(store.state(), &GameState::new(&catalog));
    }

    #[test]
    fn state_serializes_camel_case() {
        let catalog = sample_catalog();
        let store = Store::new(&catalog);
        let json = serde_json::to_value(store.state()).unwrap();
        assert!(json.get("packagesPerClick").is_some());
        assert!(json.get("totalPackagesEarned").is_some());
        assert!(json["prestige"].get("totalEarnedAllTime").is_some());
        assert!(json["buildings"]["courier"].get("basePrice").is_some());
    }
}
