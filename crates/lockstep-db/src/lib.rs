//! Storage layer for the Lockstep coordination kernel.
//!
//! The kernel itself persists nothing. Handlers and plugins that want to
//! keep results talk to a [`DatabaseService`]: a start/stop lifecycle plus
//! generic tables described with a [`TableBuilder`], with rows scoped to a
//! participant and/or a tick and committed explicitly.
//!
//! # Modules
//!
//! - [`error`] -- Shared error type
//! - [`memory`] -- [`MemoryDatabase`], the in-process backend
//! - [`recorder`] -- [`StateRecorderPlugin`], which records shared state
//!   after every tick
//! - [`service`] -- The [`DatabaseService`] trait
//! - [`table`] -- Table descriptions, scopes, and rows

pub mod error;
pub mod memory;
pub mod recorder;
pub mod service;
pub mod table;

// Re-export primary types for convenience.
pub use error::DbError;
pub use memory::MemoryDatabase;
pub use recorder::{STATE_TABLE, StateRecorderPlugin};
pub use service::{DatabaseService, StoredRow};
pub use table::{FieldSpec, FieldType, Row, RowScope, TableBuilder, TableDescriptor};
