//! Parcel Core -- the economic simulation engine for an idle parcel-delivery
//! game.
//!
//! This crate holds the canonical game state, the multiplier pipeline that
//! turns building counts into production and click value, the buffered
//! update cycle, timed effects, achievements and versioned saves. It has no
//! display layer; hosts drive it through [`engine::Engine`] and read
//! snapshots back out.
//!
//! # Update Cycle
//!
//! Each call to [`engine::Engine::advance`] moves the clock forward and:
//!
//! 1. **Drivers** -- Fires due passive-income ticks, decays buffs and events
//!    by the elapsed time, and rolls for new world events.
//! 2. **Flush** -- Applies everything buffered since the last flush in one
//!    pass: packages, earned and clicked totals, a PPS recompute if
//!    production inputs changed, then the achievement check.
//!
//! Clicks and passive income never write the balance directly:
//!
//! ```rust,ignore
//! engine.click();                 // buffered
//! engine.click();                 // coalesced with the first
//! let report = engine.advance(16); // one write for both
//! ```
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Action and tick orchestrator.
//! - [`state::Store`] -- Sole writer of [`state::GameState`].
//! - [`registry::Catalog`] -- Immutable building, upgrade, achievement and
//!   effect definitions (frozen at startup).
//! - [`multiplier::ContributorRegistry`] -- Named factors composed into the
//!   effective production and click value.
//! - [`pending::PendingUpdates`] -- Coalescing buffer drained by each flush.
//! - [`achievement::AchievementEvaluator`] -- Throttled unlock checks and
//!   cached progress.
//! - [`persistence::SaveManager`] -- Save, load, export, import and wipe
//!   with format migration.

pub mod achievement;
pub mod clock;
pub mod config;
pub mod effects;
pub mod engine;
pub mod event;
pub mod hash;
pub mod id;
pub mod migration;
pub mod multiplier;
pub mod pending;
pub mod persistence;
pub mod registry;
pub mod rng;
pub mod scheduler;
pub mod state;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
