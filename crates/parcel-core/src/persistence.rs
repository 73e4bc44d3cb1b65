//! Save, load, export, import and wipe over a [`Storage`] backend.
//!
//! A save is one JSON envelope under [`SaveConfig::key`]:
//!
//! ```json
//! { "version": "2.1.0", "timestamp": 0, "gameState": { ... }, "integrityTag": "..." }
//! ```
//!
//! The integrity tag is FNV-1a over the serialized `gameState`. It is written
//! but not checked on load; loading relies on structural validation only.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::SaveConfig;
use crate::engine::Engine;
use crate::hash::integrity_tag;
use crate::migration::{self, MigrationError, MigrationRegistry};
use crate::registry::Catalog;
use crate::state::GameState;
use crate::storage::{Storage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("corrupt or incompatible save: {0}")]
    Corrupt(#[from] MigrationError),
    #[error("save is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("save write failed after {attempts} attempts")]
    WriteFailed { attempts: u32 },
}

/// The stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEnvelope {
    pub version: String,
    pub timestamp: u64,
    pub game_state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity_tag: Option<String>,
}

impl SaveEnvelope {
    pub fn new(version: &str, state: &GameState, now_ms: u64) -> Result<Self, serde_json::Error> {
        let game_state = serde_json::to_value(state)?;
        let tag = integrity_tag(&serde_json::to_string(&game_state)?);
        Ok(Self {
            version: version.to_string(),
            timestamp: now_ms,
            game_state,
            integrity_tag: Some(tag),
        })
    }
}

pub struct SaveManager<S: Storage> {
    storage: S,
    config: SaveConfig,
    migrations: MigrationRegistry,
}

impl<S: Storage + std::fmt::Debug> std::fmt::Debug for SaveManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveManager")
            .field("storage", &self.storage)
            .field("config", &self.config)
            .field("migrations", &self.migrations)
            .finish()
    }
}

impl<S: Storage> SaveManager<S> {
    pub fn new(storage: S, config: SaveConfig) -> Self {
        Self {
            storage,
            config,
            migrations: MigrationRegistry::with_builtins(),
        }
    }

    pub fn with_migrations(mut self, migrations: MigrationRegistry) -> Self {
        self.migrations = migrations;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn config(&self) -> &SaveConfig {
        &self.config
    }

    // -- Save --

    /// Write `state` under the save key. A rejected write is retried up to
    /// `max_write_attempts` times, pruning the oldest backup in between.
    pub fn save_state(&mut self, state: &GameState, now_ms: u64) -> Result<(), PersistenceError> {
        let envelope = SaveEnvelope::new(&self.config.version, state, now_ms)?;
        let text = serde_json::to_string(&envelope)?;
        let attempts = self.config.max_write_attempts.max(1);
        for attempt in 1..=attempts {
            match self.storage.set(&self.config.key, &text) {
                Ok(()) => return Ok(()),
                Err(error) => {
                    warn!(attempt, %error, "save write failed");
                    if attempt < attempts {
                        self.prune_oldest_backup();
                    }
                }
            }
        }
        Err(PersistenceError::WriteFailed { attempts })
    }

    /// Flush the engine and save its state. Failure is logged, never raised.
    /// The engine's last save time only moves when the write lands.
    pub fn save(&mut self, engine: &mut Engine) -> bool {
        engine.flush_pending_updates();
        let now = engine.now_ms();
        let mut state = engine.snapshot();
        state.last_save_time = now;
        match self.save_state(&state, now) {
            Ok(()) => {
                engine.mark_saved(now);
                true
            }
            Err(error) => {
                warn!(%error, "save abandoned");
                false
            }
        }
    }

    // -- Load --

    /// The stored save, migrated onto current defaults. Absent, unreadable
    /// and malformed saves are all `Ok(None)`-equivalent for callers of
    /// [`SaveManager::load`]; this form reports why.
    pub fn try_load(&self, catalog: &Catalog, now_ms: u64) -> Result<Option<GameState>, PersistenceError> {
        match self.storage.get(&self.config.key)? {
            Some(text) => self.parse(&text, catalog, now_ms).map(Some),
            None => Ok(None),
        }
    }

    pub fn load(&self, catalog: &Catalog, now_ms: u64) -> Option<GameState> {
        match self.try_load(catalog, now_ms) {
            Ok(state) => state,
            Err(error) => {
                warn!(%error, "discarding unloadable save");
                None
            }
        }
    }

    /// Load into a live engine. `false` leaves the engine untouched.
    pub fn load_into(&self, engine: &mut Engine) -> bool {
        let Some(state) = self.load(engine.catalog(), engine.now_ms()) else {
            return false;
        };
        engine.load_state(state);
        info!(packages = engine.state().packages, "save loaded");
        true
    }

    fn parse(&self, text: &str, catalog: &Catalog, now_ms: u64) -> Result<GameState, PersistenceError> {
        let doc: Value = serde_json::from_str(text)?;
        Ok(migration::migrate_document(&doc, &self.migrations, catalog, now_ms)?)
    }

    // -- Export / import --

    /// The stored document with an `exportTimestamp` added, or `None` if
    /// nothing is stored.
    pub fn export(&self, now_ms: u64) -> Result<Option<String>, PersistenceError> {
        let Some(text) = self.storage.get(&self.config.key)? else {
            return Ok(None);
        };
        let mut doc: Value = serde_json::from_str(&text)?;
        let Some(obj) = doc.as_object_mut() else {
            return Err(MigrationError::Malformed("stored save is not an object".into()).into());
        };
        obj.insert("exportTimestamp".into(), Value::from(now_ms));
        Ok(Some(serde_json::to_string(&doc)?))
    }

    /// Validate and migrate `text`, back up the current save, then replace
    /// both the stored save and the engine's state. Nothing changes if
    /// `text` does not load.
    pub fn import(&mut self, engine: &mut Engine, text: &str) -> Result<(), PersistenceError> {
        let now = engine.now_ms();
        let state = self.parse(text, engine.catalog(), now)?;
        if let Some(prior) = self.storage.get(&self.config.key)? {
            let backup_key = format!("{}{}", self.config.backup_prefix, self.next_backup_stamp(now)?);
            self.storage.set(&backup_key, &prior)?;
            self.prune_backups(self.config.max_backups)?;
        }
        self.save_state(&state, now)?;
        engine.load_state(state);
        info!(packages = engine.state().packages, "save imported");
        Ok(())
    }

    // -- Wipe --

    /// Delete the stored save and start the engine over. Backups are kept.
    pub fn wipe(&mut self, engine: &mut Engine) -> Result<(), PersistenceError> {
        self.storage.remove(&self.config.key)?;
        engine.reset();
        info!("save wiped");
        Ok(())
    }

    // -- Backups --

    fn backup_stamps(&self) -> Result<Vec<(u64, String)>, PersistenceError> {
        let prefix = &self.config.backup_prefix;
        let mut keys: Vec<(u64, String)> = self
            .storage
            .keys()?
            .into_iter()
            .filter_map(|k| {
                let stamp = k.strip_prefix(prefix.as_str())?.parse().unwrap_or(0);
                Some((stamp, k))
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Backup keys, oldest first.
    pub fn backup_keys(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.backup_stamps()?.into_iter().map(|(_, k)| k).collect())
    }

    /// `now_ms`, bumped past the newest backup so keys never collide.
    fn next_backup_stamp(&self, now_ms: u64) -> Result<u64, PersistenceError> {
        let newest = self.backup_stamps()?.last().map(|(stamp, _)| *stamp);
        Ok(match newest {
            Some(stamp) if stamp >= now_ms => stamp + 1,
            _ => now_ms,
        })
    }

    pub fn backup_count(&self) -> usize {
        self.backup_keys().map_or(0, |k| k.len())
    }

    fn prune_backups(&mut self, keep: usize) -> Result<(), PersistenceError> {
        let keys = self.backup_keys()?;
        let excess = keys.len().saturating_sub(keep);
        for key in &keys[..excess] {
            self.storage.remove(key)?;
        }
        Ok(())
    }

    fn prune_oldest_backup(&mut self) {
        let oldest = match self.backup_keys() {
            Ok(keys) => keys.into_iter().next(),
            Err(error) => {
                warn!(%error, "could not list backups");
                None
            }
        };
        if let Some(key) = oldest {
            if let Err(error) = self.storage.remove(&key) {
                warn!(%error, %key, "could not remove backup");
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::*;
    use crate::storage::MemoryStorage;
    use crate::test_utils::{sample_catalog, test_engine};
    use serde_json::json;

    fn manager() -> SaveManager<MemoryStorage> {
        SaveManager::new(MemoryStorage::new(), SaveConfig::default())
    }

    fn stored(m: &SaveManager<MemoryStorage>) -> Value {
        let text = m.storage().get("parcel_save").unwrap().unwrap();
        serde_json::from_str(&text).unwrap()
    }

    // -----------------------------------------------------------------------
    // Save / load
    // -----------------------------------------------------------------------

    #[test]
    fn round_trip_keeps_totals_and_drops_buffs() {
        let catalog = sample_catalog();
        let mut state = GameState::new(&catalog);
        state.packages = 12345.0;
        state.total_packages_earned = 99999.0;
        state.active_buffs.push(crate::state::Buff {
            id: BuffId::from("frenzy"),
            kind: crate::registry::BuffKind::Production,
            multiplier: 7.0,
            remaining_ms: 1000.0,
            total_ms: 77_000.0,
        });
        let mut m = manager();
        m.save_state(&state, 10).unwrap();
        let loaded = m.load(&catalog, 20).unwrap();
        assert_eq!(loaded.packages, 12345.0);
        assert_eq!(loaded.total_packages_earned, 99999.0);
        assert!(loaded.active_buffs.is_empty());
        assert_eq!(loaded.last_tick_time, 20);
    }

    #[test]
    fn envelope_layout() {
        let catalog = sample_catalog();
        let mut m = manager();
        m.save_state(&GameState::new(&catalog), 77).unwrap();
        let doc = stored(&m);
        assert_eq!(doc["version"], json!("2.1.0"));
        assert_eq!(doc["timestamp"], json!(77));
        assert!(doc["gameState"]["buildings"].is_object());
        let tag = doc["integrityTag"].as_str().unwrap();
        assert_eq!(tag, integrity_tag(&doc["gameState"].to_string()));
    }

    #[test]
    fn missing_save_is_none() {
        assert!(manager().load(&sample_catalog(), 0).is_none());
    }

    #[test]
    fn save_without_buildings_is_no_save() {
        let mut m = manager();
        let doc = json!({ "version": "2.1.0", "timestamp": 0, "gameState": { "packages": 5 } });
        m.storage_mut().set("parcel_save", &doc.to_string()).unwrap();
        assert!(m.load(&sample_catalog(), 0).is_none());
        assert!(matches!(
            m.try_load(&sample_catalog(), 0),
            Err(PersistenceError::Corrupt(_))
        ));
    }

    #[test]
    fn garbage_save_is_no_save() {
        let mut m = manager();
        m.storage_mut().set("parcel_save", "{not json").unwrap();
        assert!(m.load(&sample_catalog(), 0).is_none());
    }

    #[test]
    fn legacy_achievement_remapped_once() {
        let mut m = manager();
        let doc = json!({
            "version": "1.0.0",
            "timestamp": 0,
            "gameState": { "cookies": 3, "buildings": {}, "achievements": ["first_click"] }
        });
        m.storage_mut().set("parcel_save", &doc.to_string()).unwrap();
        let state = m.load(&sample_catalog(), 0).unwrap();
        assert_eq!(state.achievements_unlocked.len(), 1);
        assert!(state.achievements_unlocked.contains(&AchievementId::from("click_1")));
    }

    // -----------------------------------------------------------------------
    // Retries
    // -----------------------------------------------------------------------

    #[test]
    fn transient_write_failure_is_retried() {
        let catalog = sample_catalog();
        let mut m = manager();
        m.storage_mut().set("parcel_backup_1", "{}").unwrap();
        m.storage_mut().set("parcel_backup_2", "{}").unwrap();
        m.storage_mut().fail_next_writes(1);
        m.save_state(&GameState::new(&catalog), 0).unwrap();
        assert_eq!(m.storage().rejected_writes(), 1);
        assert_eq!(m.backup_keys().unwrap(), vec!["parcel_backup_2"]);
    }

    #[test]
    fn persistent_write_failure_gives_up() {
        let (mut engine, _clock) = test_engine();
        let mut m = manager();
        m.storage_mut().fail_next_writes(10);
        assert!(!m.save(&mut engine));
        assert_eq!(m.storage().rejected_writes(), 3);
        assert!(m.storage().get("parcel_save").unwrap().is_none());
    }

    #[test]
    fn failed_save_leaves_last_save_time_alone() {
        let (mut engine, clock) = test_engine();
        clock.set(5_000);
        let mut m = manager();
        m.storage_mut().fail_next_writes(10);
        assert!(!m.save(&mut engine));
        assert_eq!(engine.state().last_save_time, 0);

        clock.set(6_000);
        assert!(m.save(&mut engine));
        assert_eq!(engine.state().last_save_time, 6_000);
    }

    #[test]
    fn engine_save_stamps_last_save_time() {
        let (mut engine, clock) = test_engine();
        clock.set(5_000);
        let mut m = manager();
        assert!(m.save(&mut engine));
        assert_eq!(engine.state().last_save_time, 5_000);
        assert_eq!(stored(&m)["gameState"]["lastSaveTime"], json!(5_000));
    }

    // -----------------------------------------------------------------------
    // Export / import / wipe
    // -----------------------------------------------------------------------

    #[test]
    fn export_adds_timestamp() {
        let catalog = sample_catalog();
        let mut m = manager();
        assert_eq!(m.export(1).unwrap(), None);
        m.save_state(&GameState::new(&catalog), 1).unwrap();
        let text = m.export(99).unwrap().unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["exportTimestamp"], json!(99));
        assert_eq!(doc["timestamp"], json!(1));
    }

    #[test]
    fn import_backs_up_and_replaces() {
        let (mut engine, clock) = test_engine();
        let mut m = manager();
        assert!(m.save(&mut engine));
        clock.set(1_000);
        let text = json!({
            "version": "2.1.0",
            "timestamp": 0,
            "gameState": { "packages": 777, "buildings": { "van": { "count": 4 } } }
        })
        .to_string();
        m.import(&mut engine, &text).unwrap();
        assert_eq!(engine.state().packages, 777.0);
        assert_eq!(engine.state().building_count(&BuildingId::from("van")), 4);
        assert_eq!(m.backup_keys().unwrap(), vec!["parcel_backup_1000"]);
        assert_eq!(m.load(engine.catalog(), 1_000).unwrap().packages, 777.0);
    }

    #[test]
    fn import_prunes_old_backups() {
        let (mut engine, clock) = test_engine();
        let mut m = manager();
        let text = json!({ "gameState": { "packages": 1, "buildings": {} } }).to_string();
        for t in 1..=5 {
            clock.set(t * 100);
            m.import(&mut engine, &text).unwrap();
        }
        // The first import had nothing to back up.
        assert_eq!(
            m.backup_keys().unwrap(),
            vec!["parcel_backup_300", "parcel_backup_400", "parcel_backup_500"]
        );
    }

    #[test]
    fn imports_in_the_same_millisecond_keep_every_backup() {
        let (mut engine, _clock) = test_engine();
        let mut m = manager();
        let first = json!({ "gameState": { "packages": 1, "buildings": {} } }).to_string();
        let second = json!({ "gameState": { "packages": 2, "buildings": {} } }).to_string();
        let third = json!({ "gameState": { "packages": 3, "buildings": {} } }).to_string();
        m.import(&mut engine, &first).unwrap();
        m.import(&mut engine, &second).unwrap();
        m.import(&mut engine, &third).unwrap();
        assert_eq!(m.backup_keys().unwrap(), vec!["parcel_backup_0", "parcel_backup_1"]);
        let packages = |key: &str| {
            let text = m.storage().get(key).unwrap().unwrap();
            serde_json::from_str::<Value>(&text).unwrap()["gameState"]["packages"].clone()
        };
        assert_eq!(packages("parcel_backup_0"), json!(1.0));
        assert_eq!(packages("parcel_backup_1"), json!(2.0));
    }

    #[test]
    fn rejected_import_changes_nothing() {
        let (mut engine, _clock) = test_engine();
        let mut m = manager();
        let before = engine.snapshot();
        assert!(m.import(&mut engine, r#"{"gameState": {"packages": 1}}"#).is_err());
        assert_eq!(engine.snapshot(), before);
        assert_eq!(m.backup_count(), 0);
        assert!(m.storage().is_empty());
    }

    #[test]
    fn wipe_removes_save_and_resets() {
        let (mut engine, _clock) = test_engine();
        let mut m = manager();
        engine.click();
        engine.advance(0);
        assert!(m.save(&mut engine));
        m.wipe(&mut engine).unwrap();
        assert!(m.storage().get("parcel_save").unwrap().is_none());
        assert_eq!(engine.state().total_clicks, 0);
        assert!(!m.load_into(&mut engine));
    }
}
