//! Throttled achievement evaluation with a per-id progress cache.
//!
//! A full check walks the catalog, skipping ids already unlocked, and
//! returns the ids that crossed their requirement in this call. Between
//! cooldowns most calls to [`AchievementEvaluator::maybe_check`] are
//! skipped by a probability roll, so an unlock may lag by up to one
//! cooldown but never longer.

use std::collections::{BTreeSet, HashMap};

use crate::config::EvaluatorConfig;
use crate::id::AchievementId;
use crate::registry::{AchievementDef, AchievementKind, Catalog};
use crate::rng::SimRng;
use crate::state::GameState;

/// Current value of the state metric an achievement kind tracks.
pub fn metric(kind: &AchievementKind, state: &GameState) -> f64 {
    match kind {
        AchievementKind::TotalEarned => state.total_packages_earned,
        AchievementKind::TotalClicked => state.total_packages_clicked,
        AchievementKind::Clicks => state.total_clicks as f64,
        AchievementKind::Pps => state.packages_per_second,
        AchievementKind::PackagesOwned => state.packages,
        AchievementKind::BuildingCount(id) => state.building_count(id) as f64,
        AchievementKind::TotalBuildings => state.total_buildings() as f64,
        AchievementKind::UpgradesOwned => state.purchased_upgrades.len() as f64,
        AchievementKind::Ascensions => state.prestige.times_ascended as f64,
        AchievementKind::WrinklersPopped => state.wrinklers_popped as f64,
    }
}

/// `min(metric / requirement, 1)`. A zero requirement is met immediately.
pub fn progress_of(def: &AchievementDef, state: &GameState) -> f64 {
    if def.requirement <= 0.0 {
        return 1.0;
    }
    (metric(&def.kind, state) / def.requirement).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy)]
struct CachedProgress {
    value: f64,
    computed_at_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AchievementEvaluator {
    config: EvaluatorConfig,
    last_full_check_ms: Option<u64>,
    cache: HashMap<AchievementId, CachedProgress>,
    /// Ids already returned as newly unlocked.
    reported: BTreeSet<AchievementId>,
    full_checks: u64,
}

impl AchievementEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            config,
            last_full_check_ms: None,
            cache: HashMap::new(),
            reported: BTreeSet::new(),
            full_checks: 0,
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Number of full checks run so far.
    pub fn full_checks(&self) -> u64 {
        self.full_checks
    }

    /// Throttled check. `None` when the call was skipped.
    pub fn maybe_check(
        &mut self,
        now_ms: u64,
        rng: &mut SimRng,
        catalog: &Catalog,
        state: &GameState,
    ) -> Option<Vec<AchievementId>> {
        let due = match self.last_full_check_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.config.cooldown_ms,
        };
        if !due && !rng.chance(self.config.check_chance) {
            return None;
        }
        Some(self.check_now(now_ms, catalog, state))
    }

    /// Unthrottled full check.
    pub fn check_now(&mut self, now_ms: u64, catalog: &Catalog, state: &GameState) -> Vec<AchievementId> {
        self.last_full_check_ms = Some(now_ms);
        self.full_checks += 1;
        let mut newly = Vec::new();
        for def in catalog.achievements() {
            if state.achievements_unlocked.contains(&def.id) || self.reported.contains(&def.id) {
                continue;
            }
            let value = progress_of(def, state);
            self.cache.insert(
                def.id.clone(),
                CachedProgress {
                    value,
                    computed_at_ms: now_ms,
                },
            );
            if value >= 1.0 {
                self.reported.insert(def.id.clone());
                newly.push(def.id.clone());
            }
        }
        newly
    }

    /// Progress in [0, 1]. Unlocked ids are pinned at 1 without touching
    /// their metric; others are served from the cache while fresh.
    pub fn progress(
        &mut self,
        id: &AchievementId,
        now_ms: u64,
        catalog: &Catalog,
        state: &GameState,
    ) -> Option<f64> {
        let def = catalog.achievement(id)?;
        if state.achievements_unlocked.contains(id) {
            return Some(1.0);
        }
        if let Some(cached) = self.cache.get(id) {
            if now_ms.saturating_sub(cached.computed_at_ms) < self.config.progress_ttl_ms {
                return Some(cached.value);
            }
        }
        let value = progress_of(def, state);
        self.cache.insert(
            id.clone(),
            CachedProgress {
                value,
                computed_at_ms: now_ms,
            },
        );
        Some(value)
    }

    /// Forget cached progress, reported ids and the cooldown clock. Called
    /// whenever the state is replaced wholesale.
    pub fn invalidate(&mut self) {
        self.cache.clear();
        self.reported.clear();
        self.last_full_check_ms = None;
    }
}
