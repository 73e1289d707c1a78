//! Environment layer for the Lockstep coordination kernel.
//!
//! Everything a participant touches goes through this crate: registration,
//! authorization keys, action dispatch to handlers, the shared-state store,
//! and typed environment services. It knows nothing about time; the driver
//! in `lockstep-core` controls when actions are accepted through the
//! [`TickGate`].
//!
//! # Modules
//!
//! - [`auth`] -- [`AuthorizationKey`] tokens issued at registration
//! - [`connector`] -- [`EnvironmentBuilder`], [`EnvironmentConnector`], and [`TickGate`]
//! - [`error`] -- [`EnvironmentError`], [`StateError`], [`HandlerError`]
//! - [`handler`] -- The [`ActionHandler`] trait and tag-to-handler [`HandlerRegistry`]
//! - [`plugin_manager`] -- The restricted [`PluginManager`] facade
//! - [`services`] -- Typed service lookup, [`MembersService`], [`ServiceGenerator`]
//! - [`state`] -- [`SharedStateStore`] with owner-only writes

pub mod auth;
pub mod connector;
pub mod error;
pub mod handler;
pub mod plugin_manager;
pub mod services;
pub mod state;

// Re-export primary types at crate root for convenience.
pub use auth::AuthorizationKey;
pub use connector::{
    ActionFailure, ActionStats, EnvironmentBuilder, EnvironmentConnector,
    EnvironmentRegistrationRequest, EnvironmentRegistrationResponse, TickGate,
};
pub use error::{
    EnvironmentError, HandlerError, OwnerLabel, OwnershipClaim, StateError, panic_message,
};
pub use handler::{ActionHandler, HandlerId, HandlerRegistry, RegisteredHandler};
pub use plugin_manager::PluginManager;
pub use services::{
    GlobalServices, MemberInfo, MembersService, ServiceGenerator, ServiceProvider, ServiceSet,
};
pub use state::{SharedStateStore, StateView, StateWriter};
