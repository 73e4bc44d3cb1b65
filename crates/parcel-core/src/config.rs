//! Engine tuning knobs. Every struct deserializes with missing fields falling
//! back to [`Default`], so data files only need to name what they change.

use serde::{Deserialize, Serialize};

/// Save-format version written into every envelope.
pub const SAVE_FORMAT_VERSION: &str = "2.1.0";

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Passive-income tick period in milliseconds.
    pub tick_ms: u64,
    /// Minimum spacing between accepted clicks.
    pub click_debounce_ms: u64,
    /// Production bonus per prestige level.
    pub prestige_step: f64,
    /// All-time earnings are divided by this before the cube root that
    /// yields the prestige level.
    pub ascension_divisor: f64,
    /// Chance per passive tick to mark achievements dirty.
    pub passive_achievement_chance: f64,
    pub seed: u64,
    pub collector: CollectorConfig,
    pub evaluator: EvaluatorConfig,
    pub events: EventSpawnConfig,
    pub loot: LootConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            click_debounce_ms: 50,
            prestige_step: 0.01,
            ascension_divisor: 1e12,
            passive_achievement_chance: 0.05,
            seed: 0x5EED_0F_BA5E,
            collector: CollectorConfig::default(),
            evaluator: EvaluatorConfig::default(),
            events: EventSpawnConfig::default(),
            loot: LootConfig::default(),
        }
    }
}

/// Wrinkler-style collection entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub spawn_chance: f64,
    pub max_entities: usize,
    /// Fraction of each tick's yield diverted into every live entity.
    pub divert_fraction: f64,
    /// Multiplier applied to an entity's hoard when popped.
    pub pop_bonus: f64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            spawn_chance: 0.001,
            max_entities: 10,
            divert_fraction: 0.05,
            pop_bonus: 1.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub cooldown_ms: u64,
    /// Chance that a call between cooldowns actually runs a check.
    pub check_chance: f64,
    pub progress_ttl_ms: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 1000,
            check_chance: 0.1,
            progress_ttl_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSpawnConfig {
    pub interval_ms: u64,
    pub spawn_chance: f64,
}

impl Default for EventSpawnConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            spawn_chance: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LootConfig {
    /// Chance per accepted click.
    pub drop_chance: f64,
}

impl Default for LootConfig {
    fn default() -> Self {
        Self { drop_chance: 0.0005 }
    }
}

/// Where and how saves are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub key: String,
    pub backup_prefix: String,
    pub max_write_attempts: u32,
    pub max_backups: usize,
    pub version: String,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            key: "parcel_save".to_string(),
            backup_prefix: "parcel_backup_".to_string(),
            max_write_attempts: 3,
            max_backups: 3,
            version: SAVE_FORMAT_VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.tick_ms, 100);
        assert_eq!(cfg.click_debounce_ms, 50);
        assert_eq!(cfg.evaluator.cooldown_ms, 1000);
        assert_eq!(cfg.evaluator.progress_ttl_ms, 5000);
        assert_eq!(cfg.collector.max_entities, 10);
        assert_eq!(SaveConfig::default().max_write_attempts, 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"tick_ms": 250, "collector": {"max_entities": 3}}"#).unwrap();
        assert_eq!(cfg.tick_ms, 250);
        assert_eq!(cfg.collector.max_entities, 3);
        assert_eq!(cfg.collector.pop_bonus, 1.1);
        assert_eq!(cfg.click_debounce_ms, 50);
    }
}
