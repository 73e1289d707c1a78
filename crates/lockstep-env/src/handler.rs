//! Action handlers and the tag-to-handler registry.
//!
//! Each [`ActionHandler`] declares the action tags it accepts and the
//! shared-state keys it owns. The [`HandlerRegistry`] checks at
//! registration time that no tag and no key is claimed twice, then
//! resolves incoming tags with a single map lookup.
//!
//! Once the registry is moved into an
//! [`EnvironmentConnector`](crate::connector::EnvironmentConnector) it can
//! no longer be modified, so dispatch during a run is fixed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use lockstep_types::{Action, ActionOutcome, ActionTag, ParticipantId, StateKey};
use tracing::debug;

use crate::error::{EnvironmentError, HandlerError, OwnershipClaim};
use crate::state::StateWriter;

/// Identity of a registered handler, assigned in registration order.
///
/// Only the registry can mint these, so a handler identity cannot be
/// forged to gain write access to another handler's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u32);

impl HandlerId {
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Return the registration index.
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Policy object that owns the mutation logic for a set of action tags.
///
/// Handlers run concurrently when participants act from parallel workers,
/// so they must be `Send + Sync`; stateful handlers keep their state in
/// the shared-state store or behind their own locks.
pub trait ActionHandler: Send + Sync {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// The action tags this handler accepts.
    fn action_tags(&self) -> Vec<ActionTag>;

    /// The shared-state keys this handler is allowed to write.
    fn owned_keys(&self) -> Vec<StateKey> {
        Vec::new()
    }

    /// Apply `action` on behalf of `actor`.
    ///
    /// The connector has already authorized `actor`; the handler only
    /// decides whether the action makes sense in its domain.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the action cannot be processed at all.
    /// Domain-level refusals should be `Ok(ActionOutcome::Rejected { .. })`.
    fn handle(
        &self,
        action: &Action,
        actor: ParticipantId,
        state: &StateWriter<'_>,
    ) -> Result<ActionOutcome, HandlerError>;
}

/// A handler together with its assigned identity.
#[derive(Clone)]
pub struct RegisteredHandler {
    id: HandlerId,
    name: String,
    handler: Arc<dyn ActionHandler>,
}

impl RegisteredHandler {
    /// The handler's identity.
    pub const fn id(&self) -> HandlerId {
        self.id
    }

    /// The handler's name, captured at registration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The handler implementation.
    pub fn handler(&self) -> &dyn ActionHandler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registry mapping action tags to exactly one handler.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: Vec<RegisteredHandler>,
    by_tag: HashMap<ActionTag, usize>,
    key_owners: BTreeMap<StateKey, HandlerId>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    ///
    /// All of the handler's tags and keys are checked before anything is
    /// inserted, so a refused registration leaves the registry untouched.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::ConflictingOwnership`] if any tag or key
    /// is already claimed, or [`EnvironmentError::Configuration`] if the
    /// handler declares no tags.
    pub fn register(
        &mut self,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<HandlerId, EnvironmentError> {
        let name = handler.name().to_owned();
        let tags: BTreeSet<ActionTag> = handler.action_tags().into_iter().collect();
        let keys: BTreeSet<StateKey> = handler.owned_keys().into_iter().collect();

        if tags.is_empty() {
            return Err(EnvironmentError::Configuration {
                reason: format!("handler `{name}` declares no action tags"),
            });
        }

        for tag in &tags {
            if let Some(existing) = self.by_tag.get(tag).and_then(|&i| self.handlers.get(i)) {
                return Err(EnvironmentError::ConflictingOwnership {
                    claim: OwnershipClaim::Tag(tag.clone()),
                    owner: existing.name.clone(),
                    claimant: name,
                });
            }
        }
        for key in &keys {
            if let Some(owner) = self.key_owners.get(key) {
                let owner_name = self
                    .handlers
                    .iter()
                    .find(|h| h.id == *owner)
                    .map_or_else(|| owner.to_string(), |h| h.name.clone());
                return Err(EnvironmentError::ConflictingOwnership {
                    claim: OwnershipClaim::Key(key.clone()),
                    owner: owner_name,
                    claimant: name,
                });
            }
        }

        let index = self.handlers.len();
        let id = u32::try_from(index)
            .map(HandlerId::new)
            .map_err(|_err| EnvironmentError::Configuration {
                reason: "too many action handlers".to_owned(),
            })?;

        debug!(%id, handler = %name, tags = tags.len(), keys = keys.len(), "Action handler registered");

        for tag in tags {
            self.by_tag.insert(tag, index);
        }
        for key in keys {
            self.key_owners.insert(key, id);
        }
        self.handlers.push(RegisteredHandler { id, name, handler });
        Ok(id)
    }

    /// Resolve an action tag to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::NoHandlerFound`] if no handler claims `tag`.
    pub fn resolve(&self, tag: &ActionTag) -> Result<&RegisteredHandler, EnvironmentError> {
        self.by_tag
            .get(tag)
            .and_then(|&i| self.handlers.get(i))
            .ok_or_else(|| EnvironmentError::NoHandlerFound { tag: tag.clone() })
    }

    /// Which handler owns each state key.
    pub const fn key_owners(&self) -> &BTreeMap<StateKey, HandlerId> {
        &self.key_owners
    }

    /// All registered tags, sorted.
    pub fn tags(&self) -> Vec<ActionTag> {
        let mut tags: Vec<ActionTag> = self.by_tag.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
