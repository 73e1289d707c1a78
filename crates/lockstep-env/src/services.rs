//! Environment services: typed capability lookup.
//!
//! A service is any `Send + Sync` value shared behind an [`Arc`]. Services
//! are keyed by their concrete type, so a consumer asks for
//! `get::<MembersService>()` and gets back an `Arc<MembersService>` or
//! nothing.
//!
//! There are two scopes:
//!
//! - **Global** services live in [`GlobalServices`] for the whole run and
//!   are visible to participants and plugins alike.
//! - **Per-participant** services are produced at registration by the
//!   configured [`ServiceGenerator`]s and live until the participant
//!   deregisters or its services are regenerated.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use lockstep_types::ParticipantId;
use serde::Serialize;

use crate::error::EnvironmentError;

type ErasedService = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
struct ServiceEntry {
    name: &'static str,
    service: ErasedService,
}

/// A set of services keyed by type.
#[derive(Clone, Default)]
pub struct ServiceSet {
    services: HashMap<TypeId, ServiceEntry>,
}

impl ServiceSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service, replacing any existing service of the same type.
    ///
    /// Returns `true` if a service was replaced.
    pub fn insert<T: Send + Sync + 'static>(&mut self, service: Arc<T>) -> bool {
        self.services
            .insert(
                TypeId::of::<T>(),
                ServiceEntry {
                    name: std::any::type_name::<T>(),
                    service,
                },
            )
            .is_some()
    }

    /// Look up a service by type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get_erased(TypeId::of::<T>())
            .and_then(|service| service.downcast::<T>().ok())
    }

    /// Remove a service by type. Returns `true` if one was present.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> bool {
        self.services.remove(&TypeId::of::<T>()).is_some()
    }

    /// Whether a service of type `T` is present.
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Type names of all services in the set, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.services.values().map(|e| e.name).collect();
        names.sort_unstable();
        names
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn get_erased(&self, type_id: TypeId) -> Option<ErasedService> {
        self.services.get(&type_id).map(|e| Arc::clone(&e.service))
    }
}

impl fmt::Debug for ServiceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Narrow capability: resolve a service by type, nothing else.
///
/// The [`PluginManager`](crate::plugin_manager::PluginManager) holds only
/// this, never the connector.
pub trait ServiceProvider: Send + Sync {
    /// Return the service registered under `type_id`, if any.
    fn provide(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// Typed lookup through any [`ServiceProvider`].
///
/// # Errors
///
/// Returns [`EnvironmentError::UnavailableService`] if the provider has no
/// service of type `T`.
pub fn lookup<T: Send + Sync + 'static>(
    provider: &dyn ServiceProvider,
) -> Result<Arc<T>, EnvironmentError> {
    provider
        .provide(TypeId::of::<T>())
        .and_then(|service| service.downcast::<T>().ok())
        .ok_or(EnvironmentError::UnavailableService {
            service: std::any::type_name::<T>(),
        })
}

/// Services shared by every participant and plugin for the whole run.
#[derive(Debug, Default)]
pub struct GlobalServices {
    set: RwLock<ServiceSet>,
}

impl GlobalServices {
    /// Create a registry seeded with `set`.
    pub const fn new(set: ServiceSet) -> Self {
        Self {
            set: RwLock::new(set),
        }
    }

    /// Add or replace a global service.
    pub fn insert<T: Send + Sync + 'static>(&self, service: Arc<T>) -> bool {
        self.set
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service)
    }

    /// Withdraw a global service. Returns `true` if one was present.
    pub fn remove<T: Send + Sync + 'static>(&self) -> bool {
        self.set
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove::<T>()
    }

    /// Type names of all global services, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.set.read().unwrap_or_else(PoisonError::into_inner).names()
    }
}

impl ServiceProvider for GlobalServices {
    fn provide(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.set
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_erased(type_id)
    }
}

/// Public record of a registered participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    /// The participant's identifier.
    pub id: ParticipantId,
    /// The participant's display name.
    pub name: String,
    /// Wall-clock time of registration.
    pub registered_at: DateTime<Utc>,
}

/// Global service listing the currently registered participants in
/// registration order.
#[derive(Debug, Default)]
pub struct MembersService {
    members: RwLock<Vec<MemberInfo>>,
}

impl MembersService {
    /// Create an empty membership list.
    pub fn new() -> Self {
        Self::default()
    }

    /// All current members, in registration order.
    pub fn members(&self) -> Vec<MemberInfo> {
        self.members.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// IDs of all current members, in registration order.
    pub fn ids(&self) -> Vec<ParticipantId> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|m| m.id)
            .collect()
    }

    /// Look up a member by ID.
    pub fn get(&self, id: ParticipantId) -> Option<MemberInfo> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.get(id).is_some()
    }

    /// Number of current members.
    pub fn len(&self) -> usize {
        self.members.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn add(&self, info: MemberInfo) {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(info);
    }

    pub(crate) fn remove(&self, id: ParticipantId) {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|m| m.id != id);
    }
}

/// Policy that builds the per-participant services at registration.
pub trait ServiceGenerator: Send + Sync {
    /// Add the services `member` should receive to `services`.
    fn generate(&self, member: &MemberInfo, services: &mut ServiceSet);
}

impl<F> ServiceGenerator for F
where
    F: Fn(&MemberInfo, &mut ServiceSet) + Send + Sync,
{
    fn generate(&self, member: &MemberInfo, services: &mut ServiceSet) {
        self(member, services);
    }
}
