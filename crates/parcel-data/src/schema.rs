//! Serde data file structs for catalog definitions.
//!
//! These structs define the on-disk format for buildings, upgrades,
//! achievements and the optional tables. They are deserialized from RON,
//! JSON, or TOML data files and then converted into catalog definitions by
//! the loader. Effect and kind enums are the core's own, so their spelling
//! is the core's snake_case.

use std::collections::BTreeMap;

use parcel_core::id::*;
use parcel_core::registry::{
    AchievementDef, AchievementKind, BuffDef, BuffKind, EventDef, EventKind, HeavenlyDef,
    HeavenlyEffect, LegacyIds, LootDef, ResearchDef, UnlockRequirement, UpgradeDef, UpgradeEffect,
};
use serde::Deserialize;

fn default_weight() -> u32 {
    1
}

fn default_count() -> u32 {
    1
}

// ===========================================================================
// Required tables
// ===========================================================================

/// A building definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildingData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub base_price: f64,
    pub base_pps: f64,
}

/// A building-count gate on an upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct RequirementData {
    pub building: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

/// An upgrade definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub cost: f64,
    pub effect: UpgradeEffect,
    #[serde(default)]
    pub requires: Option<RequirementData>,
}

impl UpgradeData {
    pub fn into_def(self) -> UpgradeDef {
        UpgradeDef {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: UpgradeId::new(self.id),
            cost: self.cost,
            effect: self.effect,
            requires: self.requires.map(|r| UnlockRequirement {
                building: BuildingId::new(r.building),
                count: r.count,
            }),
        }
    }
}

/// An achievement definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct AchievementData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: AchievementKind,
    pub requirement: f64,
    #[serde(default)]
    pub express_reward: u64,
}

impl AchievementData {
    pub fn into_def(self) -> AchievementDef {
        AchievementDef {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: AchievementId::new(self.id),
            kind: self.kind,
            requirement: self.requirement,
            express_reward: self.express_reward,
        }
    }
}

// ===========================================================================
// Optional tables
// ===========================================================================

/// A heavenly (prestige-point) upgrade in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct HeavenlyData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub cost_points: u64,
    pub effect: HeavenlyEffect,
}

impl HeavenlyData {
    pub fn into_def(self) -> HeavenlyDef {
        HeavenlyDef {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: HeavenlyId::new(self.id),
            cost_points: self.cost_points,
            effect: self.effect,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub cost_express: u64,
    pub multiplier: f64,
}

impl ResearchData {
    pub fn into_def(self) -> ResearchDef {
        ResearchDef {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: ResearchId::new(self.id),
            cost_express: self.cost_express,
            multiplier: self.multiplier,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuffData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: BuffKind,
    pub multiplier: f64,
    pub duration_ms: f64,
}

impl BuffData {
    pub fn into_def(self) -> BuffDef {
        BuffDef {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: BuffId::new(self.id),
            kind: self.kind,
            multiplier: self.multiplier,
            duration_ms: self.duration_ms,
        }
    }
}

/// A timed world event. `weight` biases the spawner's pick.
#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: EventKind,
    pub multiplier: f64,
    pub duration_ms: f64,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl EventData {
    pub fn into_def(self) -> EventDef {
        EventDef {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: EventId::new(self.id),
            kind: self.kind,
            multiplier: self.multiplier,
            duration_ms: self.duration_ms,
            weight: self.weight,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LootData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub production_bonus: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl LootData {
    pub fn into_def(self) -> LootDef {
        LootDef {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: LootId::new(self.id),
            production_bonus: self.production_bonus,
            discount: self.discount,
            weight: self.weight,
        }
    }
}

/// Old save identifiers mapped to current ones, per table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LegacyIdsData {
    pub achievements: BTreeMap<String, String>,
    pub buildings: BTreeMap<String, String>,
    pub upgrades: BTreeMap<String, String>,
}

impl LegacyIdsData {
    pub fn into_legacy(self) -> LegacyIds {
        LegacyIds {
            achievements: self
                .achievements
                .into_iter()
                .map(|(old, new)| (old, AchievementId::new(new)))
                .collect(),
            buildings: self
                .buildings
                .into_iter()
                .map(|(old, new)| (old, BuildingId::new(new)))
                .collect(),
            upgrades: self
                .upgrades
                .into_iter()
                .map(|(old, new)| (old, UpgradeId::new(new)))
                .collect(),
        }
    }
}
