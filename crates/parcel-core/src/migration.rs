//! Save-format migration.
//!
//! Loading happens in three steps:
//! 1. Chain registered step functions from the envelope's major format
//!    version up to [`CURRENT_FORMAT`], each rewriting the raw `gameState`
//!    JSON (field renames and reshapes).
//! 2. Validate the structural minimum: `packages` is a number and
//!    `buildings` is an object.
//! 3. Merge every recognized field of the right shape onto a fresh default
//!    state, remapping renamed ids and resetting ephemeral fields.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::id::{HeavenlyId, ResearchId};
use crate::registry::Catalog;
use crate::state::{GameState, RareLoot, Settings};

/// Major save-format version this build writes.
pub const CURRENT_FORMAT: u32 = 2;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MigrationError {
    #[error("no migration path from version {from} to version {to}")]
    NoMigrationPath { from: u32, to: u32 },
    #[error("migration from version {from} to version {to} failed: {reason}")]
    MigrationFailed { from: u32, to: u32, reason: String },
    #[error("malformed save: {0}")]
    Malformed(String),
}

/// Rewrites a raw `gameState` object from one major version to the next.
pub type MigrationFn = fn(Value) -> Result<Value, MigrationError>;

/// Registry of step functions keyed by source version.
///
/// Each registered function migrates data from `version N` to `version N+1`.
/// The registry chains these steps to migrate across multiple versions.
pub struct MigrationRegistry {
    migrations: BTreeMap<u32, MigrationFn>,
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("steps", &self.migrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MigrationRegistry {
    /// Create an empty migration registry.
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// Registry with every step shipped formats have needed.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.register(1, rename_legacy_fields);
        r
    }

    /// Register a migration function from `from_version` to `from_version + 1`.
    pub fn register(&mut self, from_version: u32, migrate: MigrationFn) {
        self.migrations.insert(from_version, migrate);
    }

    /// Check whether a complete migration path exists from `from` to `to`.
    pub fn can_migrate(&self, from: u32, to: u32) -> bool {
        if from >= to {
            return from == to;
        }
        (from..to).all(|v| self.migrations.contains_key(&v))
    }

    /// Chain registered steps from `from` to `to`. Returns the input
    /// unchanged if `from == to`.
    pub fn migrate(&self, data: Value, from: u32, to: u32) -> Result<Value, MigrationError> {
        if from == to {
            return Ok(data);
        }
        if from > to {
            return Err(MigrationError::NoMigrationPath { from, to });
        }
        let mut current = data;
        for version in from..to {
            let step = self
                .migrations
                .get(&version)
                .ok_or(MigrationError::NoMigrationPath { from, to })?;
            current = step(current)?;
        }
        Ok(current)
    }

    /// Number of registered migration steps.
    pub fn step_count(&self) -> usize {
        self.migrations.len()
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Major component of a `"X.Y.Z"` version. Missing or unparsable versions
/// predate versioning and count as 1.
pub fn format_major(version: Option<&str>) -> u32 {
    version
        .and_then(|v| v.split('.').next())
        .and_then(|major| major.trim().parse().ok())
        .unwrap_or(1)
}

// ---------------------------------------------------------------------------
// Version 1 -> 2
// ---------------------------------------------------------------------------

/// Old top-level names and the fields they became.
const LEGACY_FIELDS: &[(&str, &str)] = &[
    ("cookies", "packages"),
    ("cookiesPerClick", "packagesPerClick"),
    ("clickValue", "packagesPerClick"),
    ("totalEarned", "totalPackagesEarned"),
    ("packagesEarned", "totalPackagesEarned"),
    ("clicks", "totalClicks"),
    ("upgrades", "purchasedUpgrades"),
    ("achievements", "achievementsUnlocked"),
    ("buffs", "activeBuffs"),
];

/// Old flat prestige fields and their place inside `prestige`.
const LEGACY_PRESTIGE_FIELDS: &[(&str, &str)] = &[
    ("prestigeLevel", "level"),
    ("heavenlyChips", "points"),
];

fn rename_legacy_fields(data: Value) -> Result<Value, MigrationError> {
    let Value::Object(mut obj) = data else {
        return Err(MigrationError::MigrationFailed {
            from: 1,
            to: 2,
            reason: "gameState is not an object".into(),
        });
    };
    for (old, new) in LEGACY_FIELDS {
        if let Some(v) = obj.remove(*old) {
            obj.entry(*new).or_insert(v);
        }
    }
    let mut prestige = match obj.remove("prestige") {
        Some(Value::Object(p)) => p,
        _ => Map::new(),
    };
    for (old, new) in LEGACY_PRESTIGE_FIELDS {
        if let Some(v) = obj.remove(*old) {
            prestige.entry(*new).or_insert(v);
        }
    }
    obj.insert("prestige".into(), Value::Object(prestige));
    Ok(Value::Object(obj))
}

// ---------------------------------------------------------------------------
// Validation and merge
// ---------------------------------------------------------------------------

/// The structural minimum a `gameState` must have to be loadable.
pub fn validate(game_state: &Value) -> Result<(), MigrationError> {
    let obj = game_state
        .as_object()
        .ok_or_else(|| MigrationError::Malformed("gameState is not an object".into()))?;
    if !obj.get("packages").is_some_and(Value::is_number) {
        return Err(MigrationError::Malformed("packages missing or not a number".into()));
    }
    if !obj.get("buildings").is_some_and(Value::is_object) {
        return Err(MigrationError::Malformed("buildings missing or not an object".into()));
    }
    Ok(())
}

fn num(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn uint(obj: &Map<String, Value>, key: &str) -> Option<u64> {
    obj.get(key).and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
    })
}

fn strings<'a>(obj: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a str> + 'a {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

/// Copy recognized fields of `loaded` onto a fresh state. Ids are remapped
/// through the catalog's legacy table and unknown ids dropped. Buffs,
/// events and wrinklers always start empty; `lastTickTime` is `now_ms`.
pub fn merge_into_default(loaded: &Value, catalog: &Catalog, now_ms: u64) -> GameState {
    let mut state = GameState::new(catalog);
    state.last_tick_time = now_ms;
    let Some(obj) = loaded.as_object() else {
        return state;
    };
    let legacy = catalog.legacy();

    if let Some(v) = num(obj, "packages") {
        state.packages = v;
    }
    if let Some(v) = num(obj, "packagesPerClick") {
        state.packages_per_click = v;
    }
    if let Some(Value::Object(buildings)) = obj.get("buildings") {
        for (raw_id, record) in buildings {
            let count = match record {
                Value::Object(r) => uint(r, "count"),
                other => other.as_u64(),
            };
            let id = legacy.building(raw_id);
            if let (Some(count), Some(entry)) = (count, state.buildings.get_mut(&id)) {
                entry.count = count.min(u32::MAX as u64) as u32;
            }
        }
    }
    state.purchased_upgrades = strings(obj, "purchasedUpgrades")
        .map(|raw| legacy.upgrade(raw))
        .filter(|id| catalog.upgrade(id).is_some())
        .collect();
    state.achievements_unlocked = strings(obj, "achievementsUnlocked")
        .map(|raw| legacy.achievement(raw))
        .filter(|id| catalog.achievement(id).is_some())
        .collect();
    state.research_completed = strings(obj, "researchCompleted")
        .map(ResearchId::from)
        .filter(|id| catalog.research(id).is_some())
        .collect();

    if let Some(Value::Object(p)) = obj.get("prestige") {
        let prestige = &mut state.prestige;
        prestige.level = uint(p, "level").unwrap_or(0);
        prestige.points = uint(p, "points").unwrap_or(0);
        prestige.total_earned_all_time = num(p, "totalEarnedAllTime").unwrap_or(0.0);
        prestige.times_ascended = uint(p, "timesAscended").map_or(0, |n| n.min(u32::MAX as u64) as u32);
        prestige.heavenly_upgrades = strings(p, "heavenlyUpgrades")
            .map(HeavenlyId::from)
            .filter(|id| catalog.heavenly(id).is_some())
            .collect();
    }

    if let Some(v) = uint(obj, "expressPoints") {
        state.express_points = v;
    }
    if let Some(v) = uint(obj, "totalExpressPointsEarned") {
        state.total_express_points_earned = v.max(state.express_points);
    }
    if let Some(Value::Array(items)) = obj.get("rareLoot") {
        for item in items {
            if let Ok(loot) = serde_json::from_value::<RareLoot>(item.clone()) {
                let known = catalog.loot(&loot.id).is_some();
                if known && !state.rare_loot.iter().any(|l| l.id == loot.id) {
                    state.rare_loot.push(loot);
                }
            }
        }
    }
    if let Some(settings) = obj
        .get("settings")
        .and_then(|v| serde_json::from_value::<Settings>(v.clone()).ok())
    {
        state.settings = settings;
    }

    if let Some(v) = uint(obj, "lastSaveTime") {
        state.last_save_time = v;
    }
    if let Some(v) = uint(obj, "totalPlayTime") {
        state.total_play_time = v;
    }
    if let Some(v) = num(obj, "totalPackagesEarned") {
        state.total_packages_earned = v;
    }
    if let Some(v) = num(obj, "totalPackagesClicked") {
        state.total_packages_clicked = v;
    }
    if let Some(v) = uint(obj, "totalClicks") {
        state.total_clicks = v;
    }
    if let Some(v) = uint(obj, "wrinklersPopped") {
        state.wrinklers_popped = v;
    }
    if let Some(v) = uint(obj, "buildingsBoughtTotal") {
        state.buildings_bought_total = v;
    }

    // All-time earnings can never trail the run's earnings.
    if state.prestige.total_earned_all_time < state.total_packages_earned {
        state.prestige.total_earned_all_time = state.total_packages_earned;
    }
    state
}

/// Full load path for a parsed save document.
pub fn migrate_document(
    doc: &Value,
    registry: &MigrationRegistry,
    catalog: &Catalog,
    now_ms: u64,
) -> Result<GameState, MigrationError> {
    let game_state = doc
        .get("gameState")
        .filter(|v| v.is_object())
        .ok_or_else(|| MigrationError::Malformed("gameState missing or not an object".into()))?;
    let from = format_major(doc.get("version").and_then(Value::as_str));
    // Newer majors go straight to the additive merge.
    let migrated = if from < CURRENT_FORMAT {
        registry.migrate(game_state.clone(), from, CURRENT_FORMAT)?
    } else {
        game_state.clone()
    };
    validate(&migrated)?;
    Ok(merge_into_default(&migrated, catalog, now_ms))
}

// ===========================================================================
// Tests
// ===========================================================================
