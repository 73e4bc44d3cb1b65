use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a live collection entity (wrinkler). Stale after a pop.
    pub struct WrinklerId;

    /// Identifies a scheduled periodic driver.
    pub struct TimerId;
}

/// Declares a catalog identifier: an owned string with a stable ordering so
/// sets and maps keyed by it serialize deterministically.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifies a building (generator) in the catalog.
    BuildingId
);
string_id!(
    /// Identifies a permanent upgrade in the catalog.
    UpgradeId
);
string_id!(
    /// Identifies an achievement in the catalog.
    AchievementId
);
string_id!(
    /// Identifies a heavenly (prestige-currency) upgrade.
    HeavenlyId
);
string_id!(
    /// Identifies a research node bought with express points.
    ResearchId
);
string_id!(
    /// Identifies a buff definition and, while active, the buff instance.
    BuffId
);
string_id!(
    /// Identifies a timed world event definition and its active instance.
    EventId
);
string_id!(
    /// Identifies a rare loot item.
    LootId
);
