//! Plugin that records shared state into a [`DatabaseService`] every tick.
//!
//! On initialise the recorder starts the database and creates its table.
//! After every tick it inserts one row per shared-state entry, scoped to
//! the tick, and commits. On completion it stops the database.

use std::sync::Arc;

use lockstep_core::{ComponentError, Plugin, TickContext};
use lockstep_env::{PluginManager, StateView};
use lockstep_types::Time;
use serde_json::json;
use tracing::debug;

use crate::error::DbError;
use crate::service::DatabaseService;
use crate::table::{FieldType, Row, RowScope, TableBuilder, TableDescriptor};

/// Default name of the recorder's table.
pub const STATE_TABLE: &str = "shared_state";

/// Records every shared-state entry after each tick.
pub struct StateRecorderPlugin {
    db: Arc<dyn DatabaseService>,
    table: String,
    view: Option<StateView>,
    rows_recorded: usize,
}

impl StateRecorderPlugin {
    /// Record into [`STATE_TABLE`] of `db`.
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self {
            db,
            table: STATE_TABLE.to_owned(),
            view: None,
            rows_recorded: 0,
        }
    }

    /// Record into a differently named table.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Rows committed so far.
    pub const fn rows_recorded(&self) -> usize {
        self.rows_recorded
    }

    /// The table layout the recorder writes: `key`, `value`, and the
    /// clock value as `time`, keyed per time step.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidTable`] if `name` is empty.
    pub fn table_descriptor(name: &str) -> Result<TableDescriptor, DbError> {
        TableBuilder::new(name)
            .field("key", FieldType::Text)
            .field("value", FieldType::Json)
            .field("time", FieldType::Text)
            .per_timestep()
            .build()
    }
}

impl<T: Time> Plugin<T> for StateRecorderPlugin {
    fn name(&self) -> &str {
        "state-recorder"
    }

    fn initialise(&mut self, manager: &PluginManager) -> Result<(), ComponentError> {
        let view = manager.get_environment_service::<StateView>()?;
        self.view = Some((*view).clone());

        let descriptor = Self::table_descriptor(&self.table).map_err(ComponentError::other)?;
        self.db.start().map_err(ComponentError::other)?;
        self.db
            .create_table(descriptor)
            .map_err(ComponentError::other)?;
        Ok(())
    }

    fn execute(&mut self, ctx: &TickContext<T>) -> Result<(), ComponentError> {
        let view = self
            .view
            .as_ref()
            .ok_or_else(|| ComponentError::failed("state recorder used before initialise"))?;
        let scope = RowScope::at_tick(ctx.tick);
        let time = ctx.time.to_string();

        for (key, value) in view.snapshot() {
            let row = Row::new()
                .with("key", json!(key.as_str()))
                .with("value", value)
                .with("time", json!(time));
            self.db
                .insert(&self.table, scope, row)
                .map_err(ComponentError::other)?;
        }
        let committed = self.db.commit().map_err(ComponentError::other)?;
        self.rows_recorded = self.rows_recorded.saturating_add(committed);
        debug!(tick = ctx.tick, rows = committed, "State recorded");
        Ok(())
    }

    fn on_simulation_complete(&mut self) -> Result<(), ComponentError> {
        self.db.stop().map_err(ComponentError::other)
    }
}
