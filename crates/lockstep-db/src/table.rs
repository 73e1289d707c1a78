//! Table descriptions and rows.
//!
//! A table is declared with a [`TableBuilder`]: a name, typed fields, and
//! its granularity. A table keyed per participant requires every row to
//! name a participant; a table keyed per time step requires every row to
//! name a tick. A table may be both, or neither (one row per insert,
//! unscoped).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lockstep_types::ParticipantId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DbError;

/// Declared type of a table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Signed or unsigned integer.
    Integer,
    /// Any JSON number.
    Float,
    /// A string.
    Text,
    /// A boolean.
    Boolean,
    /// Any JSON value, stored as-is.
    Json,
}

impl FieldType {
    /// Whether `value` is acceptable for a field of this type.
    ///
    /// `null` is accepted by every type.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (_, Value::Null)
            | (Self::Json, _)
            | (Self::Float, Value::Number(_))
            | (Self::Text, Value::String(_))
            | (Self::Boolean, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Declared type.
    pub field_type: FieldType,
}

/// Builder for a [`TableDescriptor`].
#[derive(Debug, Clone, Default)]
pub struct TableBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    per_participant: bool,
    per_timestep: bool,
}

impl TableBuilder {
    /// Start describing a table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declare a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
        });
        self
    }

    /// Require every row to name a participant.
    #[must_use]
    pub const fn per_participant(mut self) -> Self {
        self.per_participant = true;
        self
    }

    /// Require every row to name a tick.
    #[must_use]
    pub const fn per_timestep(mut self) -> Self {
        self.per_timestep = true;
        self
    }

    /// Validate and finish the description.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidTable`] if the name is empty, no field
    /// is declared, or a field name repeats.
    pub fn build(self) -> Result<TableDescriptor, DbError> {
        let invalid = |reason: String| DbError::InvalidTable {
            table: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty".to_owned()));
        }
        if self.fields.is_empty() {
            return Err(invalid("no fields declared".to_owned()));
        }
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("field `{}` declared twice", field.name)));
            }
        }
        Ok(TableDescriptor {
            name: self.name,
            fields: self.fields,
            per_participant: self.per_participant,
            per_timestep: self.per_timestep,
        })
    }
}

/// A validated table description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    name: String,
    fields: Vec<FieldSpec>,
    per_participant: bool,
    per_timestep: bool,
}

impl TableDescriptor {
    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Whether rows are keyed by participant.
    pub const fn is_per_participant(&self) -> bool {
        self.per_participant
    }

    /// Whether rows are keyed by tick.
    pub const fn is_per_timestep(&self) -> bool {
        self.per_timestep
    }

    /// Check a row against this table.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Scope`] if the scope does not match the table's
    /// granularity, [`DbError::UnknownField`] or [`DbError::MissingField`]
    /// if the field set differs, or [`DbError::TypeMismatch`] if a value
    /// has the wrong type.
    pub fn validate(&self, scope: &RowScope, row: &Row) -> Result<(), DbError> {
        let scope_error = |reason| DbError::Scope {
            table: self.name.clone(),
            reason,
        };
        match (self.per_participant, scope.participant) {
            (true, None) => return Err(scope_error("is keyed per participant; row has none")),
            (false, Some(_)) => return Err(scope_error("is not keyed per participant")),
            _ => {}
        }
        match (self.per_timestep, scope.tick) {
            (true, None) => return Err(scope_error("is keyed per time step; row has no tick")),
            (false, Some(_)) => return Err(scope_error("is not keyed per time step")),
            _ => {}
        }

        if let Some(field) = row
            .values
            .keys()
            .find(|name| !self.fields.iter().any(|f| &f.name == *name))
        {
            return Err(DbError::UnknownField {
                table: self.name.clone(),
                field: field.clone(),
            });
        }
        for spec in &self.fields {
            let value = row.values.get(&spec.name).ok_or_else(|| DbError::MissingField {
                table: self.name.clone(),
                field: spec.name.clone(),
            })?;
            if !spec.field_type.accepts(value) {
                return Err(DbError::TypeMismatch {
                    table: self.name.clone(),
                    field: spec.name.clone(),
                    expected: spec.field_type,
                    found: json_type(value),
                });
            }
        }
        Ok(())
    }
}

/// Which participant and tick a row belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowScope {
    /// Participant the row describes, for per-participant tables.
    pub participant: Option<ParticipantId>,
    /// Tick the row was recorded at, for per-time-step tables.
    pub tick: Option<u64>,
}

impl RowScope {
    /// Scope for an unkeyed table.
    pub const fn unscoped() -> Self {
        Self {
            participant: None,
            tick: None,
        }
    }

    /// Scope for a per-time-step table.
    pub const fn at_tick(tick: u64) -> Self {
        Self {
            participant: None,
            tick: Some(tick),
        }
    }

    /// Scope for a per-participant table.
    pub const fn for_participant(participant: ParticipantId) -> Self {
        Self {
            participant: Some(participant),
            tick: None,
        }
    }

    /// Add a tick to this scope.
    #[must_use]
    pub const fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }
}

/// Field values for one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    /// An empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field from a JSON value.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    /// Set a field from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if `value` cannot be converted.
    pub fn with_serialized<V: Serialize>(
        self,
        field: impl Into<String>,
        value: &V,
    ) -> Result<Self, DbError> {
        Ok(self.with(field, serde_json::to_value(value)?))
    }

    /// Read a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// All field values, ordered by field name.
    pub const fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
