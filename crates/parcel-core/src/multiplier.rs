//! Multiplier aggregation: effective production, click value and price.
//!
//! Each factor in the formulas is a *contributor*: a tagged variant with a
//! pure `query` over the current state and the static catalog. Contributors
//! return the identity (1 for products, 0 for sums) whenever their unlock
//! condition is false, so composition folds over the registry unconditionally.
//! None of them reads the composed result, which keeps the fold order free.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::id::BuildingId;
use crate::registry::{BuffKind, Catalog, EventKind, HeavenlyEffect, UpgradeEffect};
use crate::state::GameState;

/// Everything a contributor may read.
#[derive(Debug, Clone, Copy)]
pub struct ContributorContext<'a> {
    pub state: &'a GameState,
    pub catalog: &'a Catalog,
    pub config: &'a EngineConfig,
    pub externals: &'a BTreeMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Contributor kinds
// ---------------------------------------------------------------------------

/// Global production factors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Contributor {
    UpgradeGlobal,
    Prestige,
    Heavenly,
    Buffs,
    Events,
    Research,
    RareLoot,
    Achievements,
    /// A host-supplied factor (weather, stocks, staff). Unset means 1.
    External(String),
}

impl Contributor {
    pub fn query(&self, ctx: &ContributorContext<'_>) -> f64 {
        let s = ctx.state;
        match self {
            Contributor::UpgradeGlobal => owned_upgrade_effects(ctx)
                .filter_map(|e| match e {
                    UpgradeEffect::GlobalMultiplier(f) => Some(*f),
                    _ => None,
                })
                .product(),
            Contributor::Prestige => prestige_multiplier(s, ctx.config),
            Contributor::Heavenly => owned_heavenly_effects(ctx)
                .filter_map(|e| match e {
                    HeavenlyEffect::Production(f) => Some(*f),
                    _ => None,
                })
                .product(),
            Contributor::Buffs => s
                .active_buffs
                .iter()
                .filter(|b| b.kind == BuffKind::Production)
                .map(|b| b.multiplier)
                .product(),
            Contributor::Events => s
                .active_events
                .iter()
                .filter(|e| e.kind == EventKind::ProductionBoost)
                .map(|e| e.multiplier)
                .product(),
            Contributor::Research => s
                .research_completed
                .iter()
                .filter_map(|id| ctx.catalog.research(id))
                .map(|r| r.multiplier)
                .product(),
            Contributor::RareLoot => 1.0 + s.rare_loot.iter().map(|l| l.production_bonus).sum::<f64>(),
            Contributor::Achievements => {
                let per: f64 = owned_heavenly_effects(ctx)
                    .filter_map(|e| match e {
                        HeavenlyEffect::AchievementBonus(p) => Some(*p),
                        _ => None,
                    })
                    .sum();
                1.0 + s.achievements_unlocked.len() as f64 * per
            }
            Contributor::External(name) => ctx.externals.get(name).copied().unwrap_or(1.0),
        }
    }
}

/// Multiplicative click factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClickContributor {
    UpgradeClick,
    BuffClick,
    HeavenlyClick,
}

impl ClickContributor {
    pub fn query(&self, ctx: &ContributorContext<'_>) -> f64 {
        match self {
            ClickContributor::UpgradeClick => owned_upgrade_effects(ctx)
                .filter_map(|e| match e {
                    UpgradeEffect::ClickMultiplier(f) => Some(*f),
                    _ => None,
                })
                .product(),
            ClickContributor::BuffClick => ctx
                .state
                .active_buffs
                .iter()
                .filter(|b| b.kind == BuffKind::Click)
                .map(|b| b.multiplier)
                .product(),
            ClickContributor::HeavenlyClick => owned_heavenly_effects(ctx)
                .filter_map(|e| match e {
                    HeavenlyEffect::Click(f) => Some(*f),
                    _ => None,
                })
                .product(),
        }
    }
}

/// Additive "fraction of PPS added per click" terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PpsPercentContributor {
    UpgradePpsPercent,
}

impl PpsPercentContributor {
    pub fn query(&self, ctx: &ContributorContext<'_>) -> f64 {
        match self {
            PpsPercentContributor::UpgradePpsPercent => owned_upgrade_effects(ctx)
                .filter_map(|e| match e {
                    UpgradeEffect::ClickPpsPercent(p) => Some(*p),
                    _ => None,
                })
                .sum(),
        }
    }
}

/// Price factors. Each is in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscountContributor {
    Events,
    RareLoot,
}

impl DiscountContributor {
    pub fn query(&self, ctx: &ContributorContext<'_>) -> f64 {
        match self {
            DiscountContributor::Events => ctx
                .state
                .active_events
                .iter()
                .filter(|e| e.kind == EventKind::Discount)
                .map(|e| e.multiplier)
                .product(),
            DiscountContributor::RareLoot => ctx
                .state
                .rare_loot
                .iter()
                .map(|l| 1.0 - l.discount)
                .product(),
        }
    }
}

fn owned_upgrade_effects<'a>(ctx: &ContributorContext<'a>) -> impl Iterator<Item = &'a UpgradeEffect> + 'a {
    let catalog = ctx.catalog;
    ctx.state
        .purchased_upgrades
        .iter()
        .filter_map(move |id| catalog.upgrade(id))
        .map(|u| &u.effect)
}

fn owned_heavenly_effects<'a>(ctx: &ContributorContext<'a>) -> impl Iterator<Item = &'a HeavenlyEffect> + 'a {
    let catalog = ctx.catalog;
    ctx.state
        .prestige
        .heavenly_upgrades
        .iter()
        .filter_map(move |id| catalog.heavenly(id))
        .map(|h| &h.effect)
}

/// `1 + level × prestige_step`.
pub fn prestige_multiplier(state: &GameState, config: &EngineConfig) -> f64 {
    1.0 + state.prestige.level as f64 * config.prestige_step
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered lists of active contributors plus host-set external factors.
#[derive(Debug, Clone)]
pub struct ContributorRegistry {
    global: Vec<Contributor>,
    click: Vec<ClickContributor>,
    pps_percent: Vec<PpsPercentContributor>,
    discount: Vec<DiscountContributor>,
    externals: BTreeMap<String, f64>,
}

impl Default for ContributorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ContributorRegistry {
    /// Registry with no contributors at all; every product is 1.
    pub fn empty() -> Self {
        Self {
            global: Vec::new(),
            click: Vec::new(),
            pps_percent: Vec::new(),
            discount: Vec::new(),
            externals: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        Self {
            global: vec![
                Contributor::UpgradeGlobal,
                Contributor::Prestige,
                Contributor::Heavenly,
                Contributor::Buffs,
                Contributor::Events,
                Contributor::Research,
                Contributor::RareLoot,
                Contributor::Achievements,
            ],
            click: vec![
                ClickContributor::UpgradeClick,
                ClickContributor::BuffClick,
                ClickContributor::HeavenlyClick,
            ],
            pps_percent: vec![PpsPercentContributor::UpgradePpsPercent],
            discount: vec![DiscountContributor::Events, DiscountContributor::RareLoot],
            externals: BTreeMap::new(),
        }
    }

    /// Add a global contributor. Registering the same one twice is a no-op.
    pub fn register(&mut self, contributor: Contributor) {
        if !self.global.contains(&contributor) {
            self.global.push(contributor);
        }
    }

    pub fn register_click(&mut self, contributor: ClickContributor) {
        if !self.click.contains(&contributor) {
            self.click.push(contributor);
        }
    }

    pub fn register_pps_percent(&mut self, contributor: PpsPercentContributor) {
        if !self.pps_percent.contains(&contributor) {
            self.pps_percent.push(contributor);
        }
    }

    pub fn register_discount(&mut self, contributor: DiscountContributor) {
        if !self.discount.contains(&contributor) {
            self.discount.push(contributor);
        }
    }

    /// Register `External(name)` if needed and set its factor.
    pub fn set_external(&mut self, name: &str, factor: f64) {
        self.register(Contributor::External(name.to_string()));
        self.externals.insert(name.to_string(), factor);
    }

    pub fn clear_external(&mut self, name: &str) {
        self.externals.remove(name);
    }

    pub fn global(&self) -> &[Contributor] {
        &self.global
    }

    pub fn context<'a>(
        &'a self,
        state: &'a GameState,
        catalog: &'a Catalog,
        config: &'a EngineConfig,
    ) -> ContributorContext<'a> {
        ContributorContext {
            state,
            catalog,
            config,
            externals: &self.externals,
        }
    }

    // -- Composition --

    pub fn global_product(&self, ctx: &ContributorContext<'_>) -> f64 {
        self.global.iter().map(|c| c.query(ctx)).product()
    }

    pub fn click_product(&self, ctx: &ContributorContext<'_>) -> f64 {
        self.click.iter().map(|c| c.query(ctx)).product()
    }

    pub fn pps_percent_sum(&self, ctx: &ContributorContext<'_>) -> f64 {
        self.pps_percent.iter().map(|c| c.query(ctx)).sum()
    }

    /// Product of all price factors, never above 1.
    pub fn discount_product(&self, ctx: &ContributorContext<'_>) -> f64 {
        let d: f64 = self.discount.iter().map(|c| c.query(ctx)).product();
        d.min(1.0)
    }

    /// Σ over owned buildings of count × base rate × building multiplier ×
    /// event boost, times the global product.
    pub fn effective_pps(&self, ctx: &ContributorContext<'_>) -> f64 {
        let raw: f64 = ctx
            .state
            .buildings
            .iter()
            .filter(|(_, b)| b.count > 0)
            .map(|(id, b)| {
                b.count as f64 * b.base_pps * building_multiplier(ctx, id) * building_event_boost(ctx, id)
            })
            .sum();
        if raw == 0.0 {
            return 0.0;
        }
        raw * self.global_product(ctx)
    }

    /// `(packagesPerClick × Πclick + pps × Σpercent) × prestige`.
    pub fn effective_click_value(&self, ctx: &ContributorContext<'_>) -> f64 {
        let pps = self.effective_pps(ctx);
        let base = ctx.state.packages_per_click * self.click_product(ctx);
        (base + pps * self.pps_percent_sum(ctx)) * prestige_multiplier(ctx.state, ctx.config)
    }

    /// `floor(basePrice × growth^count × discount)`; `None` for unknown ids.
    pub fn building_price(&self, ctx: &ContributorContext<'_>, id: &BuildingId) -> Option<f64> {
        let b = ctx.state.buildings.get(id)?;
        let raw = b.base_price * ctx.catalog.price_growth().powi(b.count as i32);
        Some((raw * self.discount_product(ctx)).floor())
    }
}

/// Owned `BuildingMultiplier` upgrades × `(1 + source_count × per_unit)` for
/// each owned synergy targeting the building.
pub fn building_multiplier(ctx: &ContributorContext<'_>, id: &BuildingId) -> f64 {
    owned_upgrade_effects(ctx)
        .map(|e| match e {
            UpgradeEffect::BuildingMultiplier { building, factor } if building == id => *factor,
            UpgradeEffect::Synergy {
                source,
                target,
                per_unit,
            } if target == id => 1.0 + ctx.state.building_count(source) as f64 * per_unit,
            _ => 1.0,
        })
        .product()
}

/// Product of active `BuildingBoost` events for the building.
pub fn building_event_boost(ctx: &ContributorContext<'_>, id: &BuildingId) -> f64 {
    ctx.state
        .active_events
        .iter()
        .filter(|e| matches!(&e.kind, EventKind::BuildingBoost { building } if building == id))
        .map(|e| e.multiplier)
        .product()
}
