//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::sync::Arc;

use crate::clock::ManualClock;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::id::*;
use crate::registry::*;

// ===========================================================================
// Catalog
// ===========================================================================

fn upgrade(id: &str, cost: f64, effect: UpgradeEffect, requires: Option<(&str, u32)>) -> UpgradeDef {
    UpgradeDef {
        id: UpgradeId::from(id),
        name: id.replace('_', " "),
        cost,
        effect,
        requires: requires.map(|(b, count)| UnlockRequirement {
            building: BuildingId::from(b),
            count,
        }),
    }
}

fn achievement(id: &str, kind: AchievementKind, requirement: f64, express_reward: u64) -> AchievementDef {
    AchievementDef {
        id: AchievementId::from(id),
        name: id.replace('_', " "),
        kind,
        requirement,
        express_reward,
    }
}

/// A small but complete catalog: four buildings and at least one entry in
/// every other table.
pub fn sample_catalog() -> Catalog {
    sample_builder().build().expect("sample catalog is valid")
}

/// The sample catalog before `build()`, for tests that extend it.
pub fn sample_builder() -> CatalogBuilder {
    let mut b = CatalogBuilder::new();
    b.register_building("courier", "Courier", 15.0, 0.1);
    b.register_building("van", "Delivery Van", 100.0, 1.0);
    b.register_building("depot", "Depot", 1_100.0, 8.0);
    b.register_building("drone", "Drone Fleet", 12_000.0, 47.0);

    b.register_upgrade(upgrade(
        "courier_training",
        100.0,
        UpgradeEffect::BuildingMultiplier {
            building: BuildingId::from("courier"),
            factor: 2.0,
        },
        Some(("courier", 1)),
    ));
    b.register_upgrade(upgrade("reinforced_gloves", 50.0, UpgradeEffect::ClickAdd(1.0), None));
    b.register_upgrade(upgrade("bubble_wrap", 200.0, UpgradeEffect::ClickMultiplier(2.0), None));
    b.register_upgrade(upgrade("sticky_tape", 500.0, UpgradeEffect::ClickPpsPercent(0.01), None));
    b.register_upgrade(upgrade(
        "van_dispatch",
        1_000.0,
        UpgradeEffect::Synergy {
            source: BuildingId::from("van"),
            target: BuildingId::from("courier"),
            per_unit: 0.05,
        },
        Some(("van", 1)),
    ));
    b.register_upgrade(upgrade("express_lane", 5_000.0, UpgradeEffect::GlobalMultiplier(1.5), None));

    b.register_achievement(achievement("click_1", AchievementKind::Clicks, 1.0, 1));
    b.register_achievement(achievement("click_100", AchievementKind::Clicks, 100.0, 2));
    b.register_achievement(achievement("click_1000", AchievementKind::Clicks, 1000.0, 5));
    b.register_achievement(achievement("earned_1", AchievementKind::TotalEarned, 1.0, 1));
    b.register_achievement(achievement("earned_1000", AchievementKind::TotalEarned, 1000.0, 2));
    b.register_achievement(achievement(
        "courier_10",
        AchievementKind::BuildingCount(BuildingId::from("courier")),
        10.0,
        2,
    ));
    b.register_achievement(achievement("pps_10", AchievementKind::Pps, 10.0, 3));
    b.register_achievement(achievement("pop_1", AchievementKind::WrinklersPopped, 1.0, 1));
    b.register_achievement(achievement("ascend_1", AchievementKind::Ascensions, 1.0, 10));

    b.register_heavenly(HeavenlyDef {
        id: HeavenlyId::from("angel_wings"),
        name: "Angel Wings".into(),
        cost_points: 1,
        effect: HeavenlyEffect::Production(1.1),
    });
    b.register_heavenly(HeavenlyDef {
        id: HeavenlyId::from("golden_gloves"),
        name: "Golden Gloves".into(),
        cost_points: 2,
        effect: HeavenlyEffect::Click(2.0),
    });
    b.register_heavenly(HeavenlyDef {
        id: HeavenlyId::from("milk_crate"),
        name: "Milk Crate".into(),
        cost_points: 3,
        effect: HeavenlyEffect::AchievementBonus(0.01),
    });

    b.register_research(ResearchDef {
        id: ResearchId::from("route_optimization"),
        name: "Route Optimization".into(),
        cost_express: 5,
        multiplier: 1.2,
    });

    b.register_buff(BuffDef {
        id: BuffId::from("frenzy"),
        name: "Frenzy".into(),
        kind: BuffKind::Production,
        multiplier: 7.0,
        duration_ms: 77_000.0,
    });
    b.register_buff(BuffDef {
        id: BuffId::from("click_frenzy"),
        name: "Click Frenzy".into(),
        kind: BuffKind::Click,
        multiplier: 777.0,
        duration_ms: 13_000.0,
    });

    b.register_event(EventDef {
        id: EventId::from("rush_hour"),
        name: "Rush Hour".into(),
        kind: EventKind::BuildingBoost {
            building: BuildingId::from("courier"),
        },
        multiplier: 3.0,
        duration_ms: 30_000.0,
        weight: 2,
    });
    b.register_event(EventDef {
        id: EventId::from("holiday_sale"),
        name: "Holiday Sale".into(),
        kind: EventKind::Discount,
        multiplier: 0.75,
        duration_ms: 30_000.0,
        weight: 1,
    });
    b.register_event(EventDef {
        id: EventId::from("peak_season"),
        name: "Peak Season".into(),
        kind: EventKind::ProductionBoost,
        multiplier: 2.0,
        duration_ms: 60_000.0,
        weight: 3,
    });

    b.register_loot(LootDef {
        id: LootId::from("golden_tape"),
        name: "Golden Tape".into(),
        production_bonus: 0.05,
        discount: 0.0,
        weight: 3,
    });
    b.register_loot(LootDef {
        id: LootId::from("coupon_book"),
        name: "Coupon Book".into(),
        production_bonus: 0.0,
        discount: 0.1,
        weight: 1,
    });
    b
}

/// A catalog with `n` buildings and `n` achievements, for benchmarks.
pub fn large_catalog(n: usize) -> Catalog {
    let mut b = CatalogBuilder::new();
    for i in 0..n {
        let id = format!("building_{i}");
        b.register_building(&id, &id, 15.0 * (i + 1) as f64, 0.1 * (i + 1) as f64);
        b.register_achievement(achievement(
            &format!("own_{i}"),
            AchievementKind::BuildingCount(BuildingId::new(id.clone())),
            10.0,
            0,
        ));
        b.register_upgrade(upgrade(
            &format!("boost_{i}"),
            100.0,
            UpgradeEffect::BuildingMultiplier {
                building: BuildingId::new(id),
                factor: 2.0,
            },
            None,
        ));
    }
    b.build().expect("large catalog is valid")
}

// ===========================================================================
// Engines
// ===========================================================================

/// Config with every random roll disabled, so tests are deterministic.
pub fn quiet_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.passive_achievement_chance = 0.0;
    config.collector.spawn_chance = 0.0;
    config.events.spawn_chance = 0.0;
    config.loot.drop_chance = 0.0;
    config.evaluator.check_chance = 0.0;
    config
}

/// Engine over the sample catalog with a manual clock starting at 0.
pub fn test_engine() -> (Engine, ManualClock) {
    let clock = ManualClock::new(0);
    let engine = Engine::with_clock(
        Arc::new(sample_catalog()),
        quiet_config(),
        Box::new(clock.clone()),
    );
    (engine, clock)
}

/// Like [`test_engine`] but starting with `packages` in the bank.
pub fn test_engine_with_packages(packages: f64) -> (Engine, ManualClock) {
    let (mut engine, clock) = test_engine();
    let mut state = engine.snapshot();
    state.packages = packages;
    engine.load_state(state);
    (engine, clock)
}
