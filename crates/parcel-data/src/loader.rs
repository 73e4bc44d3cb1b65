//! Loading pipeline: finds data files, deserializes them and builds the
//! frozen catalog.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers, plus [`load_catalog`], [`load_config`] and
//! [`load_game_data`] on top of them.

use std::path::{Path, PathBuf};

use parcel_core::config::EngineConfig;
use parcel_core::registry::{Catalog, CatalogBuilder, RegistryError};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::schema::*;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// The definitions parsed but do not form a valid catalog.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Find `{base_name}.ron`, `.toml` or `.json` in `dir`. `Ok(None)` if none
/// exists; an error if more than one does.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }
    Ok(found)
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, e: impl std::fmt::Display) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Read a file and deserialize it according to its format.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list. TOML has no top-level arrays, so a TOML file holds
/// the list under `toml_key` (`[[toml_key]]` tables); RON and JSON files are
/// the list itself.
pub fn deserialize_list<T: DeserializeOwned>(path: &Path, toml_key: &str) -> Result<Vec<T>, DataLoadError> {
    if detect_format(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let content = std::fs::read_to_string(path)?;
    let mut table: toml::Table = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
    let array = table
        .remove(toml_key)
        .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?;
    array.try_into().map_err(|e: toml::de::Error| parse_error(path, e))
}

fn optional_list<T: DeserializeOwned>(dir: &Path, base_name: &str) -> Result<Vec<T>, DataLoadError> {
    match find_data_file(dir, base_name)? {
        Some(path) => deserialize_list(&path, base_name),
        None => Ok(Vec::new()),
    }
}

// ===========================================================================
// Pipeline
// ===========================================================================

/// Everything a session needs from the data directory.
#[derive(Debug)]
pub struct GameData {
    pub catalog: Catalog,
    pub config: EngineConfig,
}

/// Build a catalog from `dir`. `buildings`, `upgrades` and `achievements`
/// must exist; `heavenly`, `research`, `buffs`, `events`, `loot` and
/// `legacy_ids` are optional.
pub fn load_catalog(dir: &Path) -> Result<Catalog, DataLoadError> {
    let mut builder = CatalogBuilder::new();

    let buildings: Vec<BuildingData> = deserialize_list(&require_data_file(dir, "buildings")?, "buildings")?;
    for b in &buildings {
        builder.register_building(&b.id, b.name.as_deref().unwrap_or(&b.id), b.base_price, b.base_pps);
    }
    let upgrades: Vec<UpgradeData> = deserialize_list(&require_data_file(dir, "upgrades")?, "upgrades")?;
    for u in upgrades {
        builder.register_upgrade(u.into_def());
    }
    let achievements: Vec<AchievementData> =
        deserialize_list(&require_data_file(dir, "achievements")?, "achievements")?;
    for a in achievements {
        builder.register_achievement(a.into_def());
    }

    for h in optional_list::<HeavenlyData>(dir, "heavenly")? {
        builder.register_heavenly(h.into_def());
    }
    for r in optional_list::<ResearchData>(dir, "research")? {
        builder.register_research(r.into_def());
    }
    for b in optional_list::<BuffData>(dir, "buffs")? {
        builder.register_buff(b.into_def());
    }
    for e in optional_list::<EventData>(dir, "events")? {
        builder.register_event(e.into_def());
    }
    for l in optional_list::<LootData>(dir, "loot")? {
        builder.register_loot(l.into_def());
    }
    if let Some(path) = find_data_file(dir, "legacy_ids")? {
        let legacy: LegacyIdsData = deserialize_file(&path)?;
        builder.extend_legacy(legacy.into_legacy());
    }

    let catalog = builder.build()?;
    info!(
        dir = %dir.display(),
        buildings = catalog.building_count(),
        upgrades = catalog.upgrades().len(),
        achievements = catalog.achievement_count(),
        "catalog loaded"
    );
    Ok(catalog)
}

/// `config.*` from `dir`, or defaults if there is none. Fields the file
/// leaves out keep their defaults.
pub fn load_config(dir: &Path) -> Result<EngineConfig, DataLoadError> {
    match find_data_file(dir, "config")? {
        Some(path) => {
            debug!(file = %path.display(), "reading engine config");
            deserialize_file(&path)
        }
        None => Ok(EngineConfig::default()),
    }
}

pub fn load_game_data(dir: &Path) -> Result<GameData, DataLoadError> {
    Ok(GameData {
        catalog: load_catalog(dir)?,
        config: load_config(dir)?,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
