//! In-memory [`DatabaseService`] backend.
//!
//! Holds every table in process memory. Staged rows live in a per-table
//! pending list until [`commit`](DatabaseService::commit) moves them to the
//! committed list. Nothing survives a restart.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::DbError;
use crate::service::{DatabaseService, StoredRow};
use crate::table::{Row, RowScope, TableDescriptor};

#[derive(Debug)]
struct Table {
    descriptor: TableDescriptor,
    pending: Vec<(RowScope, Row)>,
    committed: Vec<StoredRow>,
}

/// A [`DatabaseService`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    running: AtomicBool,
    tables: Mutex<BTreeMap<String, Table>>,
}

impl MemoryDatabase {
    /// Create a stopped, empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows of `table`, in commit order.
    ///
    /// Readable whether or not the database is running.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownTable`] if no such table exists.
    pub fn rows(&self, table: &str) -> Result<Vec<StoredRow>, DbError> {
        self.with_tables(|tables| {
            tables
                .get(table)
                .map(|t| t.committed.clone())
                .ok_or_else(|| DbError::UnknownTable(table.to_owned()))
        })
    }

    /// Number of staged, uncommitted rows across all tables.
    pub fn pending_rows(&self) -> usize {
        self.with_tables(|tables| tables.values().map(|t| t.pending.len()).sum())
    }

    /// Names of all tables.
    pub fn table_names(&self) -> Vec<String> {
        self.with_tables(|tables| tables.keys().cloned().collect())
    }

    /// The descriptor of `table`, if it exists.
    pub fn descriptor(&self, table: &str) -> Option<TableDescriptor> {
        self.with_tables(|tables| tables.get(table).map(|t| t.descriptor.clone()))
    }

    fn ensure_running(&self) -> Result<(), DbError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(DbError::NotRunning)
        }
    }

    fn with_tables<R>(&self, f: impl FnOnce(&mut BTreeMap<String, Table>) -> R) -> R {
        f(&mut self.tables.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl DatabaseService for MemoryDatabase {
    fn start(&self) -> Result<(), DbError> {
        if !self.running.swap(true, Ordering::AcqRel) {
            info!("In-memory database started");
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), DbError> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let discarded = self.with_tables(|tables| {
            tables
                .values_mut()
                .map(|t| std::mem::take(&mut t.pending).len())
                .sum::<usize>()
        });
        if discarded > 0 {
            warn!(discarded, "Uncommitted rows discarded on stop");
        }
        info!("In-memory database stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn create_table(&self, table: TableDescriptor) -> Result<(), DbError> {
        self.ensure_running()?;
        self.with_tables(|tables| {
            let name = table.name().to_owned();
            if tables.contains_key(&name) {
                return Err(DbError::TableExists(name));
            }
            debug!(table = %name, fields = table.fields().len(), "Table created");
            tables.insert(
                name,
                Table {
                    descriptor: table,
                    pending: Vec::new(),
                    committed: Vec::new(),
                },
            );
            Ok(())
        })
    }

    fn insert(&self, table: &str, scope: RowScope, row: Row) -> Result<(), DbError> {
        self.ensure_running()?;
        self.with_tables(|tables| {
            let target = tables
                .get_mut(table)
                .ok_or_else(|| DbError::UnknownTable(table.to_owned()))?;
            target.descriptor.validate(&scope, &row)?;
            target.pending.push((scope, row));
            Ok(())
        })
    }

    fn commit(&self) -> Result<usize, DbError> {
        self.ensure_running()?;
        let committed_at = Utc::now();
        let count = self.with_tables(|tables| {
            let mut count: usize = 0;
            for table in tables.values_mut() {
                count = count.saturating_add(table.pending.len());
                table
                    .committed
                    .extend(table.pending.drain(..).map(|(scope, row)| StoredRow {
                        scope,
                        row,
                        committed_at,
                    }));
            }
            count
        });
        debug!(rows = count, "Committed");
        Ok(count)
    }
}
