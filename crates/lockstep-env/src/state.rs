//! The shared-state store.
//!
//! A flat map from [`StateKey`] to an opaque JSON value. Anyone holding a
//! [`StateView`] may read; only the handler that owns a key may write it,
//! and only through the [`StateWriter`] the connector hands it during
//! dispatch.
//!
//! # Consistency
//!
//! - The ownership table is fixed when the store is created, so the
//!   ownership check needs no lock.
//! - Every write happens under the entries lock, so a key's value is never
//!   observed half-written and writes to the same key are serialized.
//! - [`SharedStateStore::update`] runs read-modify-write under one lock
//!   acquisition; [`SharedStateStore::write_batch`] checks ownership of
//!   every key before writing any of them.
//! - Readers clone the value out under a short read lock.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use lockstep_types::StateKey;
use serde_json::Value;

use crate::error::{OwnerLabel, StateError};
use crate::handler::HandlerId;

/// Key-value store for environment state with per-key write ownership.
#[derive(Debug, Default)]
pub struct SharedStateStore {
    owners: BTreeMap<StateKey, HandlerId>,
    entries: RwLock<BTreeMap<StateKey, Value>>,
}

impl SharedStateStore {
    /// Create a store with a fixed key ownership table.
    pub const fn with_owners(owners: BTreeMap<StateKey, HandlerId>) -> Self {
        Self {
            owners,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Read the current value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotFound`] if the key has never been written.
    pub fn read(&self, key: &StateKey) -> Result<Value, StateError> {
        self.entries_read()
            .get(key)
            .cloned()
            .ok_or_else(|| StateError::NotFound { key: key.clone() })
    }

    /// Whether a value exists for `key`.
    pub fn contains(&self, key: &StateKey) -> bool {
        self.entries_read().contains_key(key)
    }

    /// Return the handler that owns `key`, if any.
    pub fn owner_of(&self, key: &StateKey) -> Option<HandlerId> {
        self.owners.get(key).copied()
    }

    /// Write `value` under `key` on behalf of `caller`.
    ///
    /// Returns the previous value, if there was one.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unauthorized`] if `caller` does not own `key`;
    /// the store is left unchanged.
    pub fn write(
        &self,
        key: &StateKey,
        value: Value,
        caller: HandlerId,
    ) -> Result<Option<Value>, StateError> {
        self.authorize(key, caller)?;
        Ok(self.entries_write().insert(key.clone(), value))
    }

    /// Write several keys as one unit on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unauthorized`] for the first key `caller` does
    /// not own; in that case none of the entries are written.
    pub fn write_batch(
        &self,
        entries: Vec<(StateKey, Value)>,
        caller: HandlerId,
    ) -> Result<(), StateError> {
        for (key, _) in &entries {
            self.authorize(key, caller)?;
        }
        let mut guard = self.entries_write();
        for (key, value) in entries {
            guard.insert(key, value);
        }
        Ok(())
    }

    /// Atomically replace the value of `key` with `f(current)`.
    ///
    /// `f` runs while the store is locked for writing, so concurrent
    /// updates to the same key are applied one after another. If `f`
    /// returns an error the stored value is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unauthorized`] (converted into `E`) if `caller`
    /// does not own `key`, or whatever error `f` returns.
    pub fn update<E, F>(&self, key: &StateKey, caller: HandlerId, f: F) -> Result<Value, E>
    where
        E: From<StateError>,
        F: FnOnce(Option<&Value>) -> Result<Value, E>,
    {
        self.authorize(key, caller)?;
        let mut guard = self.entries_write();
        let next = f(guard.get(key))?;
        guard.insert(key.clone(), next.clone());
        Ok(next)
    }

    /// Copy every entry currently in the store.
    pub fn snapshot(&self) -> BTreeMap<StateKey, Value> {
        self.entries_read().clone()
    }

    /// Number of keys with a value.
    pub fn len(&self) -> usize {
        self.entries_read().len()
    }

    /// Whether no key has been written yet.
    pub fn is_empty(&self) -> bool {
        self.entries_read().is_empty()
    }

    fn authorize(&self, key: &StateKey, caller: HandlerId) -> Result<(), StateError> {
        match self.owners.get(key) {
            Some(owner) if *owner == caller => Ok(()),
            owner => Err(StateError::Unauthorized {
                key: key.clone(),
                caller,
                owner: OwnerLabel(owner.copied()),
            }),
        }
    }

    // A writer that panicked mid-dispatch cannot leave a half-written value
    // behind (every insert is a single statement), so a poisoned lock still
    // guards consistent data.
    fn entries_read(&self) -> RwLockReadGuard<'_, BTreeMap<StateKey, Value>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_write(&self) -> RwLockWriteGuard<'_, BTreeMap<StateKey, Value>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write capability bound to one handler identity.
///
/// The connector creates one of these for each dispatch; a handler can only
/// ever write as itself.
#[derive(Debug, Clone, Copy)]
pub struct StateWriter<'a> {
    store: &'a SharedStateStore,
    handler: HandlerId,
}

impl<'a> StateWriter<'a> {
    pub(crate) const fn new(store: &'a SharedStateStore, handler: HandlerId) -> Self {
        Self { store, handler }
    }

    /// The handler this writer acts as.
    pub const fn handler(&self) -> HandlerId {
        self.handler
    }

    /// Read any key (reads are not restricted).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotFound`] if the key has never been written.
    pub fn read(&self, key: &StateKey) -> Result<Value, StateError> {
        self.store.read(key)
    }

    /// Write a key owned by this handler.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unauthorized`] if the handler does not own `key`.
    pub fn write(&self, key: &StateKey, value: Value) -> Result<Option<Value>, StateError> {
        self.store.write(key, value, self.handler)
    }

    /// Write several owned keys as one unit.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unauthorized`] if any key is not owned; nothing
    /// is written in that case.
    pub fn write_batch(&self, entries: Vec<(StateKey, Value)>) -> Result<(), StateError> {
        self.store.write_batch(entries, self.handler)
    }

    /// Atomic read-modify-write of an owned key.
    ///
    /// # Errors
    ///
    /// See [`SharedStateStore::update`].
    pub fn update<E, F>(&self, key: &StateKey, f: F) -> Result<Value, E>
    where
        E: From<StateError>,
        F: FnOnce(Option<&Value>) -> Result<Value, E>,
    {
        self.store.update(key, self.handler, f)
    }
}

/// Read-only access to shared state, registered as a global environment
/// service.
#[derive(Debug, Clone)]
pub struct StateView {
    store: Arc<SharedStateStore>,
}

impl StateView {
    /// Wrap a store in a read-only view.
    pub const fn new(store: Arc<SharedStateStore>) -> Self {
        Self { store }
    }

    /// Read the current value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotFound`] if the key has never been written.
    pub fn read(&self, key: &StateKey) -> Result<Value, StateError> {
        self.store.read(key)
    }

    /// Whether a value exists for `key`.
    pub fn contains(&self, key: &StateKey) -> bool {
        self.store.contains(key)
    }

    /// Copy every entry currently in the store.
    pub fn snapshot(&self) -> BTreeMap<StateKey, Value> {
        self.store.snapshot()
    }
}
