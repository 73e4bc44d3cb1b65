//! Cross-crate session tests: load the bundled data, play, save, reload.

use std::path::PathBuf;
use std::sync::Arc;

use parcel_core::clock::{Clock, ManualClock};
use parcel_core::config::{EngineConfig, SaveConfig};
use parcel_core::engine::Engine;
use parcel_core::event::EngineEvent;
use parcel_core::id::*;
use parcel_core::persistence::SaveManager;
use parcel_core::registry::Catalog;
use parcel_core::storage::{FileStorage, MemoryStorage, Storage};
use parcel_core::test_utils::quiet_config;
use parcel_data::{bundled_data_dir, load_catalog, load_game_data};

fn bundled_catalog() -> Arc<Catalog> {
    Arc::new(load_catalog(&bundled_data_dir()).expect("bundled data loads"))
}

fn engine_at(catalog: Arc<Catalog>, config: EngineConfig, start_ms: u64) -> (Engine, ManualClock) {
    let clock = ManualClock::new(start_ms);
    let engine = Engine::with_clock(catalog, config, Box::new(clock.clone()));
    (engine, clock)
}

/// Buy the cheapest affordable building until nothing is affordable.
fn buy_greedily(engine: &mut Engine) -> u32 {
    let mut bought = 0;
    loop {
        let cheapest = engine
            .catalog()
            .buildings()
            .iter()
            .filter_map(|b| engine.building_price(&b.id).map(|p| (p, b.id.clone())))
            .filter(|(p, _)| *p <= engine.affordable_packages())
            .min_by(|a, b| a.0.total_cmp(&b.0));
        match cheapest {
            Some((_, id)) if engine.buy_building(&id) => bought += 1,
            _ => return bought,
        }
    }
}

/// Click and tick for `seconds` of game time, buying as packages allow.
fn play(engine: &mut Engine, clock: &ManualClock, seconds: u64) {
    for step in 0..seconds * 10 {
        clock.advance(100);
        if step % 2 == 0 {
            engine.click();
        }
        engine.advance(100);
        if step % 10 == 0 {
            buy_greedily(engine);
        }
    }
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("parcel_session_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

// ===========================================================================
// Data
// ===========================================================================

#[test]
fn bundled_data_is_complete() {
    let data = load_game_data(&bundled_data_dir()).unwrap();
    let catalog = &data.catalog;
    assert_eq!(catalog.building_count(), 8);
    assert!(catalog.upgrades().len() >= 10);
    assert!(catalog.achievement_count() >= 16);
    assert_eq!(catalog.heavenly_upgrades().len(), 3);
    assert_eq!(catalog.research_nodes().len(), 3);
    assert_eq!(catalog.buffs().len(), 3);
    assert_eq!(catalog.events().len(), 3);
    assert_eq!(catalog.loot_table().len(), 2);
    assert_eq!(catalog.legacy().building("grandma"), BuildingId::from("van"));
    assert_eq!(data.config.tick_ms, 100);
    assert_eq!(data.config.events.spawn_chance, 0.25);
}

#[test]
fn bundled_prices_start_at_base() {
    let (engine, _clock) = engine_at(bundled_catalog(), quiet_config(), 0);
    assert_eq!(engine.building_price(&BuildingId::from("courier")), Some(15.0));
    assert_eq!(engine.building_price(&BuildingId::from("van")), Some(100.0));
    assert_eq!(engine.effective_pps(), 0.0);
}

// ===========================================================================
// Sessions
// ===========================================================================

#[test]
fn five_minute_session_grows_production() {
    let (mut engine, clock) = engine_at(bundled_catalog(), quiet_config(), 0);
    play(&mut engine, &clock, 300);

    let state = engine.state();
    assert!(state.total_buildings() > 10);
    assert!(engine.effective_pps() > 1.0);
    assert!(state.total_packages_earned > state.total_packages_clicked);
    assert_eq!(state.total_play_time, 300_000);
    assert!(state.achievements_unlocked.contains(&AchievementId::from("click_1")));
    assert!(state.achievements_unlocked.contains(&AchievementId::from("courier_10")));
    assert!(state.express_points > 0);
    assert!(state.packages >= 0.0);
}

#[test]
fn session_round_trips_through_file_storage() {
    let dir = temp_dir("file_round_trip");
    let (mut engine, clock) = engine_at(bundled_catalog(), quiet_config(), 1_000);
    play(&mut engine, &clock, 120);
    assert!(engine.activate_buff(&BuffId::from("tailwind")));

    let mut saves = SaveManager::new(FileStorage::open(&dir).unwrap(), SaveConfig::default());
    assert!(saves.save(&mut engine));
    let saved = engine.snapshot();

    let (mut restored, _clock2) = engine_at(engine.catalog().clone(), quiet_config(), clock.now_ms());
    let reader = SaveManager::new(FileStorage::open(&dir).unwrap(), SaveConfig::default());
    assert!(reader.load_into(&mut restored));

    let state = restored.state();
    assert_eq!(state.packages, saved.packages);
    assert_eq!(state.buildings, saved.buildings);
    assert_eq!(state.purchased_upgrades, saved.purchased_upgrades);
    assert_eq!(state.total_packages_earned, saved.total_packages_earned);
    assert_eq!(state.total_clicks, saved.total_clicks);
    assert!(state.achievements_unlocked.is_superset(&saved.achievements_unlocked));
    assert_eq!(state.last_save_time, saved.last_save_time);
    assert!(state.active_buffs.is_empty());
    assert!(!saved.active_buffs.is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn seeded_sessions_are_deterministic() {
    let mut config = EngineConfig::default();
    config.collector.spawn_chance = 0.05;
    config.events.interval_ms = 5_000;
    config.events.spawn_chance = 0.5;
    config.loot.drop_chance = 0.01;

    let catalog = bundled_catalog();
    let (mut a, clock_a) = engine_at(catalog.clone(), config.clone(), 0);
    let (mut b, clock_b) = engine_at(catalog, config, 0);
    play(&mut a, &clock_a, 120);
    play(&mut b, &clock_b, 120);
    assert_eq!(a.snapshot(), b.snapshot());
    assert_eq!(a.drain_events(), b.drain_events());
}

#[test]
fn random_systems_fire_over_a_long_session() {
    let mut config = EngineConfig::default();
    config.collector.spawn_chance = 0.05;
    config.events.interval_ms = 5_000;
    config.events.spawn_chance = 1.0;

    let (mut engine, clock) = engine_at(bundled_catalog(), config, 0);
    let seen = std::rc::Rc::new(std::cell::Cell::new(0u32));
    let counter = seen.clone();
    engine.on_event(Box::new(move |_: &EngineEvent| counter.set(counter.get() + 1)));
    play(&mut engine, &clock, 60);
    let events = engine.drain_events();
    assert!(events.iter().any(|e| matches!(e, EngineEvent::EventStarted { .. })));
    assert!(events.iter().any(|e| matches!(e, EngineEvent::EntitySpawned { .. })));
    assert!(seen.get() as usize >= events.len());

    let live = engine.state().wrinklers.len();
    assert!(live > 0);
    let released = engine.pop_all_entities();
    engine.advance(0);
    assert!(released >= 0.0);
    assert!(engine.state().wrinklers.is_empty());
    assert_eq!(engine.state().wrinklers_popped, live as u64);
    assert!(engine.state().achievements_unlocked.contains(&AchievementId::from("pop_1")));
}

// ===========================================================================
// Saves from older versions
// ===========================================================================

#[test]
fn legacy_save_loads_against_bundled_catalog() {
    let mut storage = MemoryStorage::new();
    let legacy = serde_json::json!({
        "version": "1.4.2",
        "timestamp": 1_600_000_000_000u64,
        "gameState": {
            "cookies": 2500,
            "totalEarned": 9000,
            "clicks": 320,
            "buildings": { "cursor": 12, "grandma": { "count": 3 }, "farm": 7 },
            "upgrades": ["grandma_upgrade"],
            "achievements": ["first_click", "hundred_clicks"],
            "heavenlyChips": 2,
            "buffs": [{ "id": "frenzy", "remainingMs": 5000 }],
            "wrinklers": { "junk": true }
        }
    });
    storage.set("parcel_save", &legacy.to_string()).unwrap();
    let saves = SaveManager::new(storage, SaveConfig::default());

    let (mut engine, _clock) = engine_at(bundled_catalog(), quiet_config(), 50);
    assert!(saves.load_into(&mut engine));
    let state = engine.state();
    assert_eq!(state.packages, 2500.0);
    assert_eq!(state.total_clicks, 320);
    assert_eq!(state.building_count(&BuildingId::from("courier")), 12);
    assert_eq!(state.building_count(&BuildingId::from("van")), 3);
    assert!(state.purchased_upgrades.contains(&UpgradeId::from("courier_training")));
    assert!(state.achievements_unlocked.contains(&AchievementId::from("click_1")));
    assert!(state.achievements_unlocked.contains(&AchievementId::from("click_100")));
    assert!(!state.achievements_unlocked.iter().any(|a| a.as_str() == "first_click"));
    assert_eq!(state.prestige.points, 2);
    assert_eq!(state.prestige.total_earned_all_time, 9000.0);
    assert!(state.active_buffs.is_empty());
    assert!(state.wrinklers.is_empty());
    // Reconciled on load: twelve couriers clears the ten-courier achievement.
    assert!(state.achievements_unlocked.contains(&AchievementId::from("courier_10")));
}

#[test]
fn ascend_save_and_continue() {
    let mut config = quiet_config();
    config.ascension_divisor = 100.0;
    let catalog = bundled_catalog();
    let (mut engine, clock) = engine_at(catalog.clone(), config.clone(), 0);
    play(&mut engine, &clock, 120);
    let expected = engine.pending_ascension_levels();
    assert!(expected > 0);
    assert!(engine.ascend());
    assert_eq!(engine.state().total_buildings(), 0);
    assert!(engine.purchase_heavenly(&HeavenlyId::from("angel_wings")));

    let mut saves = SaveManager::new(MemoryStorage::new(), SaveConfig::default());
    assert!(saves.save(&mut engine));
    let (mut next, next_clock) = engine_at(catalog, config, clock.now_ms());
    assert!(saves.load_into(&mut next));
    assert_eq!(next.state().prestige.level, expected);
    assert!(next.state().prestige.heavenly_upgrades.contains(&HeavenlyId::from("angel_wings")));
    assert!(next.state().achievements_unlocked.contains(&AchievementId::from("ascend_1")));

    // Prestige makes the second run faster than a fresh one.
    play(&mut next, &next_clock, 60);
    let (mut fresh, fresh_clock) = engine_at(bundled_catalog(), quiet_config(), 0);
    play(&mut fresh, &fresh_clock, 60);
    assert!(next.state().total_packages_earned > fresh.state().total_packages_earned);
}
