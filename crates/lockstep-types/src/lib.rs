//! Shared type definitions for the Lockstep coordination kernel.
//!
//! This crate holds the small vocabulary every other crate speaks:
//! identifiers, logical time, actions and their outcomes, and shared-state
//! keys. It has no behavior of its own beyond conversions.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for participants and plugins
//! - [`time`] -- The [`Time`] trait and the default [`IntegerTime`]
//! - [`actions`] -- [`Action`], [`ActionTag`], and [`ActionOutcome`]
//! - [`state`] -- [`StateKey`] for shared-state entries

pub mod actions;
pub mod ids;
pub mod state;
pub mod time;

// Re-export all public types at crate root for convenience.
pub use actions::{Action, ActionOutcome, ActionTag, PayloadError};
pub use ids::{ParticipantId, PluginId};
pub use state::StateKey;
pub use time::{IntegerTime, Time};
