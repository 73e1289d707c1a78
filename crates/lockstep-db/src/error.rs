//! Error types for the storage layer.
//!
//! All storage operations report [`DbError`], which names the table and
//! field involved where one applies.

use crate::table::FieldType;

/// Errors that can occur in the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The database has not been started, or has been stopped.
    #[error("database is not running")]
    NotRunning,

    /// A table description is invalid.
    #[error("invalid table `{table}`: {reason}")]
    InvalidTable {
        /// Table name.
        table: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A table with this name already exists.
    #[error("table `{0}` already exists")]
    TableExists(String),

    /// No table with this name exists.
    #[error("unknown table `{0}`")]
    UnknownTable(String),

    /// A row named a field the table does not declare.
    #[error("table `{table}` has no field `{field}`")]
    UnknownField {
        /// Table name.
        table: String,
        /// The undeclared field.
        field: String,
    },

    /// A row left out a declared field.
    #[error("row for `{table}` is missing field `{field}`")]
    MissingField {
        /// Table name.
        table: String,
        /// The missing field.
        field: String,
    },

    /// A value does not match its field's declared type.
    #[error("field `{field}` of `{table}` expects {expected}, got {found}")]
    TypeMismatch {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
        /// The declared type.
        expected: FieldType,
        /// JSON type of the value supplied.
        found: &'static str,
    },

    /// A row's scope does not match the table's granularity.
    #[error("table `{table}` {reason}")]
    Scope {
        /// Table name.
        table: String,
        /// Which part of the scope is wrong.
        reason: &'static str,
    },

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
