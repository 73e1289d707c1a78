//! The storage interface consumed by handlers and plugins.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DbError;
use crate::table::{Row, RowScope, TableDescriptor};

/// A committed row as returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRow {
    /// Scope the row was inserted under.
    pub scope: RowScope,
    /// The row's values.
    pub row: Row,
    /// When the row was committed.
    pub committed_at: DateTime<Utc>,
}

/// Lifecycle plus generic table storage.
///
/// Inserts are staged until [`commit`](Self::commit). Every method takes
/// `&self`; implementations synchronise internally so a single instance
/// can be shared as an environment service.
pub trait DatabaseService: Send + Sync {
    /// Start the backend. Starting a running backend is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the backend cannot start.
    fn start(&self) -> Result<(), DbError>;

    /// Stop the backend. Uncommitted rows are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the backend cannot stop cleanly.
    fn stop(&self) -> Result<(), DbError>;

    /// Whether the backend is running.
    fn is_running(&self) -> bool;

    /// Create a table.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotRunning`] or [`DbError::TableExists`].
    fn create_table(&self, table: TableDescriptor) -> Result<(), DbError>;

    /// Stage a row for insertion.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotRunning`], [`DbError::UnknownTable`], or any
    /// validation error from [`TableDescriptor::validate`].
    fn insert(&self, table: &str, scope: RowScope, row: Row) -> Result<(), DbError>;

    /// Make every staged row durable and return how many were committed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotRunning`] if the backend is stopped.
    fn commit(&self) -> Result<usize, DbError>;
}
