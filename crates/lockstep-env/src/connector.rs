//! The environment connector: registration, authorization, and dispatch.
//!
//! [`EnvironmentConnector`] is the single gateway between participants and
//! the shared environment. It issues an [`AuthorizationKey`] per
//! registration, checks that key on every call, routes actions to the one
//! handler that claims their tag, and hands out environment services.
//!
//! An environment is assembled with [`EnvironmentBuilder`]. `build()`
//! freezes the handler registry and the key ownership table, and returns
//! the connector together with a [`TickGate`]. The gate belongs to the
//! time-step driver; it opens and closes the window in which `act()` is
//! accepted and collects per-tick action statistics.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use lockstep_types::{Action, ActionOutcome, ActionTag, ParticipantId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::AuthorizationKey;
use crate::error::{EnvironmentError, panic_message};
use crate::handler::{ActionHandler, HandlerId, HandlerRegistry};
use crate::plugin_manager::PluginManager;
use crate::services::{
    GlobalServices, MemberInfo, MembersService, ServiceGenerator, ServiceProvider, ServiceSet,
    lookup,
};
use crate::state::{SharedStateStore, StateView, StateWriter};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles an environment before a run.
#[derive(Default)]
pub struct EnvironmentBuilder {
    registry: HandlerRegistry,
    services: ServiceSet,
    generators: Vec<Arc<dyn ServiceGenerator>>,
}

impl EnvironmentBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action handler.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::ConflictingOwnership`] if the handler
    /// claims a tag or key that another handler already claims, or
    /// [`EnvironmentError::Configuration`] if it declares no tags.
    pub fn register_handler<H: ActionHandler + 'static>(
        &mut self,
        handler: H,
    ) -> Result<HandlerId, EnvironmentError> {
        self.registry.register(Arc::new(handler))
    }

    /// Add a global environment service.
    pub fn add_service<T: Send + Sync + 'static>(&mut self, service: Arc<T>) -> &mut Self {
        self.services.insert(service);
        self
    }

    /// Add a policy that produces per-participant services at registration.
    ///
    /// Generators run in the order they were added; a later generator may
    /// replace a service an earlier one produced.
    pub fn add_service_generator<G: ServiceGenerator + 'static>(
        &mut self,
        generator: G,
    ) -> &mut Self {
        self.generators.push(Arc::new(generator));
        self
    }

    /// The handlers registered so far.
    pub const fn handlers(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Freeze the configuration and create the connector.
    ///
    /// The [`MembersService`] and [`StateView`] global services are always
    /// present in the result.
    pub fn build(self) -> (Arc<EnvironmentConnector>, TickGate) {
        let store = Arc::new(SharedStateStore::with_owners(
            self.registry.key_owners().clone(),
        ));
        let members = Arc::new(MembersService::new());

        let mut services = self.services;
        services.insert(Arc::clone(&members));
        services.insert(Arc::new(StateView::new(Arc::clone(&store))));

        let window = Arc::new(TickWindow::default());

        info!(
            handlers = self.registry.len(),
            tags = self.registry.tags().len(),
            owned_keys = self.registry.key_owners().len(),
            services = services.len(),
            "Environment built"
        );

        let connector = Arc::new(EnvironmentConnector {
            registry: self.registry,
            store,
            participants: RwLock::new(HashMap::new()),
            globals: Arc::new(GlobalServices::new(services)),
            members,
            generators: self.generators,
            window: Arc::clone(&window),
        });
        (connector, TickGate { window })
    }
}

impl fmt::Debug for EnvironmentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentBuilder")
            .field("registry", &self.registry)
            .field("services", &self.services)
            .field("generators", &self.generators.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registration messages
// ---------------------------------------------------------------------------

/// A participant's request to join the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentRegistrationRequest {
    /// The participant's identifier.
    pub participant: ParticipantId,
    /// The participant's display name.
    pub name: String,
}

impl EnvironmentRegistrationRequest {
    /// Build a request.
    pub fn new(participant: ParticipantId, name: impl Into<String>) -> Self {
        Self {
            participant,
            name: name.into(),
        }
    }
}

/// What a participant receives on successful registration.
#[derive(Debug, Clone)]
pub struct EnvironmentRegistrationResponse {
    /// The registered participant.
    pub participant: ParticipantId,
    /// The key to present on every subsequent call.
    pub key: AuthorizationKey,
    /// Per-participant services produced by the configured generators.
    pub services: ServiceSet,
}

// ---------------------------------------------------------------------------
// Tick window
// ---------------------------------------------------------------------------

/// Counts of `act()` results within one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionStats {
    /// Actions the handler applied.
    pub applied: u64,
    /// Actions the handler declined on domain grounds.
    pub rejected: u64,
    /// Actions whose handler returned an error or panicked.
    pub failed: u64,
    /// Calls refused before reaching a handler (bad key, unknown tag,
    /// closed tick).
    pub refused: u64,
    /// Details of every handler failure, in the order they happened.
    pub failures: Vec<ActionFailure>,
}

/// One handler failure recorded during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    /// The participant whose action failed.
    pub actor: ParticipantId,
    /// The action's tag.
    pub tag: ActionTag,
    /// Name of the failing handler.
    pub handler: String,
    /// Description of the failure.
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Setup,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, Default)]
struct WindowState {
    phase: Phase,
    tick: u64,
}

impl WindowState {
    fn check_open(self) -> Result<(), EnvironmentError> {
        if self.phase == Phase::Closed {
            return Err(EnvironmentError::TickClosed { tick: self.tick });
        }
        Ok(())
    }
}

/// Shared between the connector and the gate. Every `act()` holds the
/// state read lock from the window check until its stats are recorded;
/// `open` and `close` take the write lock, so they wait for in-flight
/// dispatches.
#[derive(Debug, Default)]
struct TickWindow {
    state: RwLock<WindowState>,
    stats: Mutex<ActionStats>,
}

impl TickWindow {
    fn state_read(&self) -> RwLockReadGuard<'_, WindowState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_write(&self) -> RwLockWriteGuard<'_, WindowState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_stats(&self) -> ActionStats {
        std::mem::take(&mut *self.stats.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn record<F: FnOnce(&mut ActionStats)>(&self, f: F) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// Driver-side control of the action window.
///
/// Before the first [`open`](Self::open) the environment is in setup and
/// `act()` is always accepted. From then on, `act()` is accepted only
/// between `open` and [`close`](Self::close).
#[derive(Debug)]
pub struct TickGate {
    window: Arc<TickWindow>,
}

impl TickGate {
    /// Open the window for `tick` and reset the action statistics.
    pub fn open(&self, tick: u64) {
        let mut state = self.window.state_write();
        self.window.take_stats();
        *state = WindowState {
            phase: Phase::Open,
            tick,
        };
    }

    /// Close the window and return the statistics gathered since `open`.
    ///
    /// Waits for any `act()` still being dispatched, so its effects and
    /// statistics belong to the tick being closed.
    pub fn close(&self) -> ActionStats {
        let mut state = self.window.state_write();
        state.phase = Phase::Closed;
        self.window.take_stats()
    }

    /// Whether `act()` is currently accepted.
    pub fn is_open(&self) -> bool {
        self.window.state_read().phase != Phase::Closed
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ParticipantEntry {
    name: String,
    key: AuthorizationKey,
    services: ServiceSet,
}

/// Authoritative gateway between participants and the environment.
///
/// Safe to share across threads; every method takes `&self`.
pub struct EnvironmentConnector {
    registry: HandlerRegistry,
    store: Arc<SharedStateStore>,
    participants: RwLock<HashMap<ParticipantId, ParticipantEntry>>,
    globals: Arc<GlobalServices>,
    members: Arc<MembersService>,
    generators: Vec<Arc<dyn ServiceGenerator>>,
    window: Arc<TickWindow>,
}

impl EnvironmentConnector {
    /// Admit a participant and issue its authorization key.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::AlreadyRegistered`] if the participant
    /// is already registered.
    pub fn register(
        &self,
        request: EnvironmentRegistrationRequest,
    ) -> Result<EnvironmentRegistrationResponse, EnvironmentError> {
        let EnvironmentRegistrationRequest { participant, name } = request;
        if self.is_registered(participant) {
            warn!(%participant, "Duplicate registration refused");
            return Err(EnvironmentError::AlreadyRegistered { participant });
        }

        // Generators run without the participants lock held; they may call
        // back into the connector.
        let info = MemberInfo {
            id: participant,
            name: name.clone(),
            registered_at: Utc::now(),
        };
        let services = self.generate_services(&info);

        let mut participants = self.participants_write();
        if participants.contains_key(&participant) {
            warn!(%participant, "Duplicate registration refused");
            return Err(EnvironmentError::AlreadyRegistered { participant });
        }

        let mut key = AuthorizationKey::generate();
        while participants.values().any(|entry| entry.key == key) {
            key = AuthorizationKey::generate();
        }

        participants.insert(
            participant,
            ParticipantEntry {
                name: name.clone(),
                key: key.clone(),
                services: services.clone(),
            },
        );
        self.members.add(info);
        drop(participants);

        info!(%participant, name = %name, services = services.len(), "Participant registered");

        Ok(EnvironmentRegistrationResponse {
            participant,
            key,
            services,
        })
    }

    /// Submit an action on behalf of `actor`.
    ///
    /// Returns the handler's outcome unchanged. A
    /// [`ActionOutcome::Rejected`] is a successful dispatch.
    ///
    /// # Errors
    ///
    /// - [`EnvironmentError::InvalidAuthorization`] if `actor` is not
    ///   registered or `key` is not its current key.
    /// - [`EnvironmentError::TickClosed`] if a run is in progress and no
    ///   tick window is open.
    /// - [`EnvironmentError::NoHandlerFound`] if no handler claims the tag.
    /// - [`EnvironmentError::ActionExecutionFailed`] if the handler
    ///   returned an error or panicked.
    pub fn act(
        &self,
        action: &Action,
        actor: ParticipantId,
        key: &AuthorizationKey,
    ) -> Result<ActionOutcome, EnvironmentError> {
        let window = self.window.state_read();
        let routed = self
            .authorize(actor, key)
            .and_then(|()| window.check_open())
            .and_then(|()| self.registry.resolve(action.tag()));
        let entry = match routed {
            Ok(entry) => entry,
            Err(err) => {
                self.window.record(|s| s.refused = s.refused.saturating_add(1));
                return Err(err);
            }
        };

        let writer = StateWriter::new(&self.store, entry.id());
        let result = catch_unwind(AssertUnwindSafe(|| {
            entry.handler().handle(action, actor, &writer)
        }));

        let reason = match result {
            Ok(Ok(outcome)) => {
                let applied = outcome.is_applied();
                self.window.record(|s| {
                    if applied {
                        s.applied = s.applied.saturating_add(1);
                    } else {
                        s.rejected = s.rejected.saturating_add(1);
                    }
                });
                debug!(
                    %actor,
                    tag = %action.tag(),
                    handler = entry.name(),
                    applied,
                    "Action dispatched"
                );
                return Ok(outcome);
            }
            Ok(Err(err)) => err.to_string(),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };

        warn!(
            %actor,
            tag = %action.tag(),
            handler = entry.name(),
            reason = %reason,
            "Action handler failed"
        );
        self.window.record(|s| {
            s.failed = s.failed.saturating_add(1);
            s.failures.push(ActionFailure {
                actor,
                tag: action.tag().clone(),
                handler: entry.name().to_owned(),
                reason: reason.clone(),
            });
        });
        drop(window);
        Err(EnvironmentError::ActionExecutionFailed {
            tag: action.tag().clone(),
            handler: entry.name().to_owned(),
            reason,
        })
    }

    /// Remove a participant and invalidate its key.
    ///
    /// The participant's per-participant services are dropped and it
    /// receives no further ticks.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::InvalidAuthorization`] if the participant
    /// is not registered or `key` is not its current key.
    pub fn deregister(
        &self,
        participant: ParticipantId,
        key: &AuthorizationKey,
    ) -> Result<(), EnvironmentError> {
        let mut participants = self.participants_write();
        match participants.get(&participant) {
            Some(entry) if entry.key == *key => {}
            _ => {
                warn!(%participant, "Deregistration with invalid authorization refused");
                return Err(EnvironmentError::InvalidAuthorization { participant });
            }
        }
        let removed = participants.remove(&participant);
        self.members.remove(participant);
        drop(participants);

        info!(
            %participant,
            name = removed.as_ref().map_or("", |e| e.name.as_str()),
            "Participant deregistered"
        );
        Ok(())
    }

    /// Whether `participant` is currently registered.
    pub fn is_registered(&self, participant: ParticipantId) -> bool {
        self.participants_read().contains_key(&participant)
    }

    /// Whether `key` is the live key of `participant`.
    ///
    /// Unlike [`is_registered`](Self::is_registered), this is `false` for a
    /// key from an earlier registration of the same id.
    pub fn is_current(&self, participant: ParticipantId, key: &AuthorizationKey) -> bool {
        self.participants_read()
            .get(&participant)
            .is_some_and(|entry| entry.key == *key)
    }

    /// Currently registered participants, in registration order.
    pub fn registered_participants(&self) -> Vec<ParticipantId> {
        self.members.ids()
    }

    /// Look up a global environment service by type.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::UnavailableService`] if none is
    /// registered.
    pub fn get_environment_service<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<T>, EnvironmentError> {
        lookup::<T>(self.globals.as_ref())
    }

    /// Look up a service for `participant`, checking its own services
    /// first and then the global ones.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::InvalidAuthorization`] if the key is not
    /// current, or [`EnvironmentError::UnavailableService`] if neither
    /// scope has a service of type `T`.
    pub fn get_participant_service<T: Send + Sync + 'static>(
        &self,
        participant: ParticipantId,
        key: &AuthorizationKey,
    ) -> Result<Arc<T>, EnvironmentError> {
        let own = {
            let participants = self.participants_read();
            match participants.get(&participant) {
                Some(entry) if entry.key == *key => entry.services.get::<T>(),
                _ => return Err(EnvironmentError::InvalidAuthorization { participant }),
            }
        };
        own.map_or_else(|| self.get_environment_service::<T>(), Ok)
    }

    /// Recompute a participant's per-participant services from the
    /// configured generators, replacing the previous set.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::InvalidAuthorization`] if the key is not
    /// current.
    pub fn regenerate_services(
        &self,
        participant: ParticipantId,
        key: &AuthorizationKey,
    ) -> Result<ServiceSet, EnvironmentError> {
        let name = match self.participants_read().get(&participant) {
            Some(entry) if entry.key == *key => entry.name.clone(),
            _ => return Err(EnvironmentError::InvalidAuthorization { participant }),
        };
        let info = self.members.get(participant).unwrap_or_else(|| MemberInfo {
            id: participant,
            name,
            registered_at: Utc::now(),
        });
        let services = self.generate_services(&info);

        // The participant may have left while the generators ran.
        let mut participants = self.participants_write();
        let entry = match participants.get_mut(&participant) {
            Some(entry) if entry.key == *key => entry,
            _ => return Err(EnvironmentError::InvalidAuthorization { participant }),
        };
        entry.services = services;
        debug!(%participant, services = entry.services.len(), "Participant services regenerated");
        Ok(entry.services.clone())
    }

    /// Add or replace a global service. Returns `true` if one was replaced.
    pub fn add_environment_service<T: Send + Sync + 'static>(&self, service: Arc<T>) -> bool {
        let replaced = self.globals.insert(service);
        debug!(service = std::any::type_name::<T>(), replaced, "Environment service added");
        replaced
    }

    /// Withdraw a global service. Returns `true` if one was present.
    pub fn remove_environment_service<T: Send + Sync + 'static>(&self) -> bool {
        let removed = self.globals.remove::<T>();
        debug!(service = std::any::type_name::<T>(), removed, "Environment service removed");
        removed
    }

    /// Type names of the global services, sorted.
    pub fn environment_service_names(&self) -> Vec<&'static str> {
        self.globals.names()
    }

    /// A service-discovery handle for plugins.
    pub fn plugin_manager(&self) -> PluginManager {
        PluginManager::new(Arc::clone(&self.globals) as Arc<dyn ServiceProvider>)
    }

    /// Read-only view of shared state.
    pub fn state_view(&self) -> StateView {
        StateView::new(Arc::clone(&self.store))
    }

    /// The frozen handler registry.
    pub const fn handlers(&self) -> &HandlerRegistry {
        &self.registry
    }

    fn authorize(
        &self,
        participant: ParticipantId,
        key: &AuthorizationKey,
    ) -> Result<(), EnvironmentError> {
        match self.participants_read().get(&participant) {
            Some(entry) if entry.key == *key => Ok(()),
            _ => {
                warn!(%participant, "Action with invalid authorization refused");
                Err(EnvironmentError::InvalidAuthorization { participant })
            }
        }
    }

    fn generate_services(&self, member: &MemberInfo) -> ServiceSet {
        let mut services = ServiceSet::new();
        for generator in &self.generators {
            generator.generate(member, &mut services);
        }
        services
    }

    fn participants_read(&self) -> RwLockReadGuard<'_, HashMap<ParticipantId, ParticipantEntry>> {
        self.participants.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn participants_write(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<ParticipantId, ParticipantEntry>> {
        self.participants.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EnvironmentConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentConnector")
            .field("registry", &self.registry)
            .field("participants", &self.members.len())
            .field("services", &self.globals.names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use lockstep_types::StateKey;
    use serde_json::json;

    use super::*;
    use crate::error::HandlerError;

    struct Flag;

    impl ActionHandler for Flag {
        fn name(&self) -> &str {
            "flag"
        }
        fn action_tags(&self) -> Vec<ActionTag> {
            vec![ActionTag::from("raise")]
        }
        fn owned_keys(&self) -> Vec<StateKey> {
            vec![StateKey::from("flag")]
        }
        fn handle(
            &self,
            _action: &Action,
            _actor: ParticipantId,
            state: &StateWriter<'_>,
        ) -> Result<ActionOutcome, HandlerError> {
            state.write(&StateKey::from("flag"), json!(true))?;
            Ok(ActionOutcome::applied())
        }
    }

    fn environment() -> (Arc<EnvironmentConnector>, TickGate) {
        let mut builder = EnvironmentBuilder::new();
        builder.register_handler(Flag).unwrap();
        builder.build()
    }

    #[test]
    fn built_environment_has_builtin_services() {
        let (env, _gate) = environment();
        assert!(env.get_environment_service::<MembersService>().is_ok());
        assert!(env.get_environment_service::<StateView>().is_ok());
    }

    #[test]
    fn setup_phase_accepts_actions() {
        let (env, gate) = environment();
        let id = ParticipantId::new();
        let response = env
            .register(EnvironmentRegistrationRequest::new(id, "a"))
            .unwrap();
        assert!(gate.is_open());
        assert!(env.act(&Action::bare("raise"), id, &response.key).is_ok());
    }

    #[test]
    fn closed_window_refuses_and_counts() {
        let (env, gate) = environment();
        let id = ParticipantId::new();
        let key = env
            .register(EnvironmentRegistrationRequest::new(id, "a"))
            .unwrap()
            .key;

        gate.open(1);
        env.act(&Action::bare("raise"), id, &key).unwrap();
        let stats = gate.close();
        assert_eq!(stats.applied, 1);

        let err = env.act(&Action::bare("raise"), id, &key).unwrap_err();
        assert!(matches!(err, EnvironmentError::TickClosed { tick: 1 }));

        gate.open(2);
        let stats = gate.close();
        assert_eq!(stats, ActionStats::default());
    }

    struct Slow {
        started: Arc<Barrier>,
    }

    impl ActionHandler for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn action_tags(&self) -> Vec<ActionTag> {
            vec![ActionTag::from("crawl")]
        }
        fn owned_keys(&self) -> Vec<StateKey> {
            vec![StateKey::from("crawled")]
        }
        fn handle(
            &self,
            _action: &Action,
            _actor: ParticipantId,
            state: &StateWriter<'_>,
        ) -> Result<ActionOutcome, HandlerError> {
            self.started.wait();
            thread::sleep(Duration::from_millis(50));
            state.write(&StateKey::from("crawled"), json!(true))?;
            Ok(ActionOutcome::applied())
        }
    }

    #[test]
    fn close_waits_for_in_flight_actions() {
        let started = Arc::new(Barrier::new(2));
        let mut builder = EnvironmentBuilder::new();
        builder
            .register_handler(Slow {
                started: Arc::clone(&started),
            })
            .unwrap();
        let (env, gate) = builder.build();
        let id = ParticipantId::new();
        let key = env
            .register(EnvironmentRegistrationRequest::new(id, "a"))
            .unwrap()
            .key;

        gate.open(1);
        let actor = Arc::clone(&env);
        let worker = thread::spawn(move || actor.act(&Action::bare("crawl"), id, &key));
        started.wait();
        let stats = gate.close();

        assert_eq!(stats.applied, 1);
        assert!(worker.join().unwrap().is_ok());
        assert_eq!(
            env.state_view().read(&StateKey::from("crawled")).unwrap(),
            json!(true)
        );
        gate.open(2);
        assert_eq!(gate.close(), ActionStats::default());
    }

    #[test]
    fn handler_panic_reason_carries_the_message() {
        struct Boom;
        impl ActionHandler for Boom {
            fn name(&self) -> &str {
                "boom"
            }
            fn action_tags(&self) -> Vec<ActionTag> {
                vec![ActionTag::from("boom")]
            }
            fn owned_keys(&self) -> Vec<StateKey> {
                Vec::new()
            }
            fn handle(
                &self,
                _action: &Action,
                _actor: ParticipantId,
                _state: &StateWriter<'_>,
            ) -> Result<ActionOutcome, HandlerError> {
                panic!("boom");
            }
        }

        let mut builder = EnvironmentBuilder::new();
        builder.register_handler(Boom).unwrap();
        let (env, _gate) = builder.build();
        let id = ParticipantId::new();
        let key = env
            .register(EnvironmentRegistrationRequest::new(id, "a"))
            .unwrap()
            .key;
        match env.act(&Action::bare("boom"), id, &key).unwrap_err() {
            EnvironmentError::ActionExecutionFailed { reason, .. } => {
                assert_eq!(reason, "panicked: boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
