//! Parcel Data -- loads catalogs and engine configuration from data files.
//!
//! A data directory holds one file per table, in RON, TOML or JSON:
//! `buildings`, `upgrades` and `achievements` are required; `heavenly`,
//! `research`, `buffs`, `events`, `loot`, `legacy_ids` and `config` are
//! optional. The crate ships a complete set under `data/`.

pub mod loader;
pub mod schema;

pub use loader::{load_catalog, load_config, load_game_data, DataLoadError, GameData};

/// The data directory bundled with this crate.
pub fn bundled_data_dir() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("data")
}
