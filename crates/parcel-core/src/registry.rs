//! Static game catalog: buildings, upgrades, achievements and the other
//! read-only tables the simulation consults.
//!
//! The catalog is built once through [`CatalogBuilder`] and frozen. The engine
//! holds it behind an `Arc` and never mutates it.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::id::*;

/// Default growth factor applied to a building's price per owned unit.
pub const DEFAULT_PRICE_GROWTH: f64 = 1.15;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A building (generator) definition.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingDef {
    pub id: BuildingId,
    pub name: String,
    pub base_price: f64,
    /// Packages per second produced by one unit before multipliers.
    pub base_pps: f64,
}

/// What a permanent upgrade does once purchased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeEffect {
    /// Multiplies total production.
    GlobalMultiplier(f64),
    /// Multiplies one building's production.
    BuildingMultiplier { building: BuildingId, factor: f64 },
    /// Multiplies click value.
    ClickMultiplier(f64),
    /// Adds a fraction of effective PPS to every click.
    ClickPpsPercent(f64),
    /// Adds a flat amount to the base click value.
    ClickAdd(f64),
    /// Each owned `source` boosts `target` production by `per_unit`.
    Synergy {
        source: BuildingId,
        target: BuildingId,
        per_unit: f64,
    },
}

/// Building-count gate for an upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockRequirement {
    pub building: BuildingId,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeDef {
    pub id: UpgradeId,
    pub name: String,
    pub cost: f64,
    pub effect: UpgradeEffect,
    pub requires: Option<UnlockRequirement>,
}

/// Which state metric an achievement's progress derives from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    TotalEarned,
    TotalClicked,
    Clicks,
    Pps,
    PackagesOwned,
    BuildingCount(BuildingId),
    TotalBuildings,
    UpgradesOwned,
    Ascensions,
    WrinklersPopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AchievementDef {
    pub id: AchievementId,
    pub name: String,
    pub kind: AchievementKind,
    pub requirement: f64,
    /// Express points granted when unlocked.
    pub express_reward: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeavenlyEffect {
    Production(f64),
    Click(f64),
    /// Production bonus per unlocked achievement.
    AchievementBonus(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeavenlyDef {
    pub id: HeavenlyId,
    pub name: String,
    pub cost_points: u64,
    pub effect: HeavenlyEffect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResearchDef {
    pub id: ResearchId,
    pub name: String,
    pub cost_express: u64,
    pub multiplier: f64,
}

/// Whether a buff multiplies production or click value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffKind {
    Production,
    Click,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuffDef {
    pub id: BuffId,
    pub name: String,
    pub kind: BuffKind,
    pub multiplier: f64,
    pub duration_ms: f64,
}

/// What a timed world event affects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProductionBoost,
    BuildingBoost { building: BuildingId },
    /// `multiplier` is the price factor, in (0, 1].
    Discount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventDef {
    pub id: EventId,
    pub name: String,
    pub kind: EventKind,
    pub multiplier: f64,
    pub duration_ms: f64,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LootDef {
    pub id: LootId,
    pub name: String,
    /// Added to the rare-loot production factor (`1 + sum`).
    pub production_bonus: f64,
    /// Fraction knocked off building prices, in [0, 1).
    pub discount: f64,
    pub weight: u32,
}

/// Renamed identifiers from older saves, mapped to their current ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyIds {
    pub achievements: BTreeMap<String, AchievementId>,
    pub buildings: BTreeMap<String, BuildingId>,
    pub upgrades: BTreeMap<String, UpgradeId>,
}

impl LegacyIds {
    /// The renames every shipped save format has needed so far.
    pub fn builtin() -> Self {
        let mut legacy = Self::default();
        for (old, new) in [
            ("first_click", "click_1"),
            ("hundred_clicks", "click_100"),
            ("thousand_clicks", "click_1000"),
            ("first_package", "earned_1"),
        ] {
            legacy.achievements.insert(old.to_string(), AchievementId::from(new));
        }
        legacy
            .buildings
            .insert("cursor".to_string(), BuildingId::from("courier"));
        legacy
            .upgrades
            .insert("grandma_upgrade".to_string(), UpgradeId::from("courier_training"));
        legacy
    }

    pub fn achievement(&self, raw: &str) -> AchievementId {
        self.achievements
            .get(raw)
            .cloned()
            .unwrap_or_else(|| AchievementId::from(raw))
    }

    pub fn building(&self, raw: &str) -> BuildingId {
        self.buildings
            .get(raw)
            .cloned()
            .unwrap_or_else(|| BuildingId::from(raw))
    }

    pub fn upgrade(&self, raw: &str) -> UpgradeId {
        self.upgrades
            .get(raw)
            .cloned()
            .unwrap_or_else(|| UpgradeId::from(raw))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("duplicate {kind} id: {id}")]
    Duplicate { kind: &'static str, id: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{kind} '{id}' references unknown building '{building}'")]
    UnknownBuildingRef {
        kind: &'static str,
        id: String,
        building: String,
    },
    #[error("invalid value for {field} on '{id}': {value}")]
    InvalidValue {
        id: String,
        field: &'static str,
        value: f64,
    },
    #[error(
        "price of '{id}' would not strictly increase per purchase (base {base_price}, growth {growth}, discount {discount})"
    )]
    PriceNotMonotonic {
        id: String,
        base_price: f64,
        growth: f64,
        discount: f64,
    },
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing an immutable [`Catalog`].
/// Three-phase lifecycle: registration -> mutation -> finalization.
#[derive(Debug)]
pub struct CatalogBuilder {
    price_growth: f64,
    buildings: Vec<BuildingDef>,
    upgrades: Vec<UpgradeDef>,
    achievements: Vec<AchievementDef>,
    heavenly: Vec<HeavenlyDef>,
    research: Vec<ResearchDef>,
    buffs: Vec<BuffDef>,
    events: Vec<EventDef>,
    loot: Vec<LootDef>,
    legacy: LegacyIds,
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self {
            price_growth: DEFAULT_PRICE_GROWTH,
            buildings: Vec::new(),
            upgrades: Vec::new(),
            achievements: Vec::new(),
            heavenly: Vec::new(),
            research: Vec::new(),
            buffs: Vec::new(),
            events: Vec::new(),
            loot: Vec::new(),
            legacy: LegacyIds::builtin(),
        }
    }

    pub fn price_growth(&mut self, growth: f64) -> &mut Self {
        self.price_growth = growth;
        self
    }

    pub fn register_building(&mut self, id: &str, name: &str, base_price: f64, base_pps: f64) -> BuildingId {
        let id = BuildingId::from(id);
        self.buildings.push(BuildingDef {
            id: id.clone(),
            name: name.to_string(),
            base_price,
            base_pps,
        });
        id
    }

    pub fn register_upgrade(&mut self, def: UpgradeDef) -> UpgradeId {
        let id = def.id.clone();
        self.upgrades.push(def);
        id
    }

    pub fn register_achievement(&mut self, def: AchievementDef) -> AchievementId {
        let id = def.id.clone();
        self.achievements.push(def);
        id
    }

    pub fn register_heavenly(&mut self, def: HeavenlyDef) -> HeavenlyId {
        let id = def.id.clone();
        self.heavenly.push(def);
        id
    }

    pub fn register_research(&mut self, def: ResearchDef) -> ResearchId {
        let id = def.id.clone();
        self.research.push(def);
        id
    }

    pub fn register_buff(&mut self, def: BuffDef) -> BuffId {
        let id = def.id.clone();
        self.buffs.push(def);
        id
    }

    pub fn register_event(&mut self, def: EventDef) -> EventId {
        let id = def.id.clone();
        self.events.push(def);
        id
    }

    pub fn register_loot(&mut self, def: LootDef) -> LootId {
        let id = def.id.clone();
        self.loot.push(def);
        id
    }

    /// Add extra legacy renames on top of the built-in table.
    pub fn extend_legacy(&mut self, extra: LegacyIds) -> &mut Self {
        self.legacy.achievements.extend(extra.achievements);
        self.legacy.buildings.extend(extra.buildings);
        self.legacy.upgrades.extend(extra.upgrades);
        self
    }

    /// Phase 2: Mutate an existing building by id.
    pub fn mutate_building<F>(&mut self, id: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut BuildingDef),
    {
        let def = self
            .buildings
            .iter_mut()
            .find(|b| b.id.as_str() == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        f(def);
        Ok(())
    }

    /// Phase 2: Mutate an existing upgrade by id.
    pub fn mutate_upgrade<F>(&mut self, id: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut UpgradeDef),
    {
        let def = self
            .upgrades
            .iter_mut()
            .find(|u| u.id.as_str() == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        f(def);
        Ok(())
    }

    /// Phase 3: Validate and freeze.
    pub fn build(self) -> Result<Catalog, RegistryError> {
        if !self.price_growth.is_finite() || self.price_growth <= 1.0 {
            return Err(RegistryError::InvalidValue {
                id: "catalog".to_string(),
                field: "price_growth",
                value: self.price_growth,
            });
        }

        let mut building_index = HashMap::new();
        for (i, b) in self.buildings.iter().enumerate() {
            if building_index.insert(b.id.clone(), i).is_some() {
                return Err(RegistryError::Duplicate {
                    kind: "building",
                    id: b.id.0.clone(),
                });
            }
            check_non_negative(&b.id.0, "base_pps", b.base_pps)?;
            check_non_negative(&b.id.0, "base_price", b.base_price)?;
        }

        let known = |kind: &'static str, id: &str, building: &BuildingId| {
            if building_index.contains_key(building) {
                Ok(())
            } else {
                Err(RegistryError::UnknownBuildingRef {
                    kind,
                    id: id.to_string(),
                    building: building.0.clone(),
                })
            }
        };

        let mut upgrade_index = HashMap::new();
        for (i, u) in self.upgrades.iter().enumerate() {
            if upgrade_index.insert(u.id.clone(), i).is_some() {
                return Err(RegistryError::Duplicate {
                    kind: "upgrade",
                    id: u.id.0.clone(),
                });
            }
            check_non_negative(&u.id.0, "cost", u.cost)?;
            match &u.effect {
                UpgradeEffect::BuildingMultiplier { building, .. } => known("upgrade", &u.id.0, building)?,
                UpgradeEffect::Synergy { source, target, .. } => {
                    known("upgrade", &u.id.0, source)?;
                    known("upgrade", &u.id.0, target)?;
                }
                _ => {}
            }
            if let Some(req) = &u.requires {
                known("upgrade", &u.id.0, &req.building)?;
            }
        }

        let mut achievement_index = HashMap::new();
        for (i, a) in self.achievements.iter().enumerate() {
            if achievement_index.insert(a.id.clone(), i).is_some() {
                return Err(RegistryError::Duplicate {
                    kind: "achievement",
                    id: a.id.0.clone(),
                });
            }
            if let AchievementKind::BuildingCount(building) = &a.kind {
                known("achievement", &a.id.0, building)?;
            }
            check_non_negative(&a.id.0, "requirement", a.requirement)?;
        }

        let heavenly_index = index_unique(&self.heavenly, "heavenly", |h| &h.id)?;
        let research_index = index_unique(&self.research, "research", |r| &r.id)?;
        let buff_index = index_unique(&self.buffs, "buff", |b| &b.id)?;
        let event_index = index_unique(&self.events, "event", |e| &e.id)?;
        let loot_index = index_unique(&self.loot, "loot", |l| &l.id)?;

        for e in &self.events {
            match &e.kind {
                EventKind::BuildingBoost { building } => known("event", &e.id.0, building)?,
                EventKind::Discount => {
                    if !(e.multiplier > 0.0 && e.multiplier <= 1.0) {
                        return Err(RegistryError::InvalidValue {
                            id: e.id.0.clone(),
                            field: "multiplier",
                            value: e.multiplier,
                        });
                    }
                }
                EventKind::ProductionBoost => {}
            }
        }
        for l in &self.loot {
            if !(0.0..1.0).contains(&l.discount) {
                return Err(RegistryError::InvalidValue {
                    id: l.id.0.clone(),
                    field: "discount",
                    value: l.discount,
                });
            }
        }

        // Every discount active at once is the deepest the price can be cut.
        let deepest_discount: f64 = self
            .events
            .iter()
            .filter(|e| e.kind == EventKind::Discount)
            .map(|e| e.multiplier)
            .chain(self.loot.iter().map(|l| 1.0 - l.discount))
            .product();
        for b in &self.buildings {
            // Integer steps of at least one survive the floor in the price formula.
            if b.base_price * (self.price_growth - 1.0) * deepest_discount < 1.0 {
                return Err(RegistryError::PriceNotMonotonic {
                    id: b.id.0.clone(),
                    base_price: b.base_price,
                    growth: self.price_growth,
                    discount: deepest_discount,
                });
            }
        }

        Ok(Catalog {
            price_growth: self.price_growth,
            buildings: self.buildings,
            building_index,
            upgrades: self.upgrades,
            upgrade_index,
            achievements: self.achievements,
            achievement_index,
            heavenly: self.heavenly,
            heavenly_index,
            research: self.research,
            research_index,
            buffs: self.buffs,
            buff_index,
            events: self.events,
            event_index,
            loot: self.loot,
            loot_index,
            legacy: self.legacy,
        })
    }
}

fn check_non_negative(id: &str, field: &'static str, value: f64) -> Result<(), RegistryError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RegistryError::InvalidValue {
            id: id.to_string(),
            field,
            value,
        })
    }
}

fn index_unique<T, K>(
    defs: &[T],
    kind: &'static str,
    key: impl Fn(&T) -> &K,
) -> Result<HashMap<K, usize>, RegistryError>
where
    K: Clone + Eq + std::hash::Hash + std::fmt::Display,
{
    let mut index = HashMap::with_capacity(defs.len());
    for (i, def) in defs.iter().enumerate() {
        let id = key(def);
        if index.insert(id.clone(), i).is_some() {
            return Err(RegistryError::Duplicate {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(index)
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable catalog. Frozen after build(). Safe to share.
#[derive(Debug)]
pub struct Catalog {
    price_growth: f64,
    buildings: Vec<BuildingDef>,
    building_index: HashMap<BuildingId, usize>,
    upgrades: Vec<UpgradeDef>,
    upgrade_index: HashMap<UpgradeId, usize>,
    achievements: Vec<AchievementDef>,
    achievement_index: HashMap<AchievementId, usize>,
    heavenly: Vec<HeavenlyDef>,
    heavenly_index: HashMap<HeavenlyId, usize>,
    research: Vec<ResearchDef>,
    research_index: HashMap<ResearchId, usize>,
    buffs: Vec<BuffDef>,
    buff_index: HashMap<BuffId, usize>,
    events: Vec<EventDef>,
    event_index: HashMap<EventId, usize>,
    loot: Vec<LootDef>,
    loot_index: HashMap<LootId, usize>,
    legacy: LegacyIds,
}

impl Catalog {
    pub fn price_growth(&self) -> f64 {
        self.price_growth
    }

    pub fn buildings(&self) -> &[BuildingDef] {
        &self.buildings
    }

    pub fn building(&self, id: &BuildingId) -> Option<&BuildingDef> {
        self.building_index.get(id).map(|&i| &self.buildings[i])
    }

    pub fn upgrades(&self) -> &[UpgradeDef] {
        &self.upgrades
    }

    pub fn upgrade(&self, id: &UpgradeId) -> Option<&UpgradeDef> {
        self.upgrade_index.get(id).map(|&i| &self.upgrades[i])
    }

    pub fn achievements(&self) -> &[AchievementDef] {
        &self.achievements
    }

    pub fn achievement(&self, id: &AchievementId) -> Option<&AchievementDef> {
        self.achievement_index.get(id).map(|&i| &self.achievements[i])
    }

    pub fn heavenly_upgrades(&self) -> &[HeavenlyDef] {
        &self.heavenly
    }

    pub fn heavenly(&self, id: &HeavenlyId) -> Option<&HeavenlyDef> {
        self.heavenly_index.get(id).map(|&i| &self.heavenly[i])
    }

    pub fn research_nodes(&self) -> &[ResearchDef] {
        &self.research
    }

    pub fn research(&self, id: &ResearchId) -> Option<&ResearchDef> {
        self.research_index.get(id).map(|&i| &self.research[i])
    }

    pub fn buffs(&self) -> &[BuffDef] {
        &self.buffs
    }

    pub fn buff(&self, id: &BuffId) -> Option<&BuffDef> {
        self.buff_index.get(id).map(|&i| &self.buffs[i])
    }

    pub fn events(&self) -> &[EventDef] {
        &self.events
    }

    pub fn event(&self, id: &EventId) -> Option<&EventDef> {
        self.event_index.get(id).map(|&i| &self.events[i])
    }

    pub fn loot_table(&self) -> &[LootDef] {
        &self.loot
    }

    pub fn loot(&self, id: &LootId) -> Option<&LootDef> {
        self.loot_index.get(id).map(|&i| &self.loot[i])
    }

    pub fn legacy(&self) -> &LegacyIds {
        &self.legacy
    }

    pub fn building_count(&self) -> usize {
        self.buildings.len()
    }

    pub fn achievement_count(&self) -> usize {
        self.achievements.len()
    }
}
