//! Time-driven components: participants and plugins.
//!
//! A [`Participant`] is an acting agent. It is registered with the
//! environment, receives a [`ParticipantHandle`] carrying its authorization
//! key, and is stepped once per tick. Everything it does to shared state
//! goes through [`ParticipantHandle::act`].
//!
//! A [`Plugin`] observes and augments the run. It runs after all
//! participants each tick and can only discover services through its
//! [`PluginManager`]; it has no way to act.

use std::sync::Arc;

use lockstep_env::{
    AuthorizationKey, EnvironmentConnector, EnvironmentError, EnvironmentRegistrationResponse,
    PluginManager, ServiceSet,
};
use lockstep_types::{Action, ActionOutcome, IntegerTime, ParticipantId, Time};

/// What every component sees for the current tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickContext<T: Time = IntegerTime> {
    /// Tick number, starting at 1 for the first tick of the run.
    pub tick: u64,
    /// Clock value for this tick.
    pub time: T,
}

/// Errors a participant or plugin hook can report to the driver.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// An environment call failed and the component could not recover.
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// The hook panicked; the driver caught the unwind.
    #[error("panicked: {message}")]
    Panicked {
        /// The panic message, if it was a string.
        message: String,
    },

    /// Component-specific failure.
    #[error("{reason}")]
    Failed {
        /// Description of the failure.
        reason: String,
    },

    /// Failure from a dependency such as a storage backend.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ComponentError {
    /// Creates a component-specific failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Wraps any error from a dependency.
    pub fn other<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }
}

/// A participant's connection to the environment.
///
/// Bundles the connector with the participant's identity and current key,
/// so the key never has to be threaded through participant code by hand.
#[derive(Debug, Clone)]
pub struct ParticipantHandle {
    connector: Arc<EnvironmentConnector>,
    id: ParticipantId,
    key: AuthorizationKey,
    services: ServiceSet,
}

impl ParticipantHandle {
    /// Build a handle from a successful registration.
    pub fn new(
        connector: Arc<EnvironmentConnector>,
        registration: EnvironmentRegistrationResponse,
    ) -> Self {
        Self {
            connector,
            id: registration.participant,
            key: registration.key,
            services: registration.services,
        }
    }

    /// The participant's identifier.
    pub const fn id(&self) -> ParticipantId {
        self.id
    }

    /// The participant's current key.
    pub const fn key(&self) -> &AuthorizationKey {
        &self.key
    }

    /// Services issued at registration (or the last regeneration).
    pub const fn services(&self) -> &ServiceSet {
        &self.services
    }

    /// Submit an action.
    ///
    /// # Errors
    ///
    /// See [`EnvironmentConnector::act`].
    pub fn act(&self, action: &Action) -> Result<ActionOutcome, EnvironmentError> {
        self.connector.act(action, self.id, &self.key)
    }

    /// Look up a service, own scope first, then global.
    ///
    /// # Errors
    ///
    /// See [`EnvironmentConnector::get_participant_service`].
    pub fn service<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, EnvironmentError> {
        self.connector.get_participant_service::<T>(self.id, &self.key)
    }

    /// Recompute this participant's services and keep the new set.
    ///
    /// # Errors
    ///
    /// See [`EnvironmentConnector::regenerate_services`].
    pub fn regenerate_services(&mut self) -> Result<&ServiceSet, EnvironmentError> {
        self.services = self.connector.regenerate_services(self.id, &self.key)?;
        Ok(&self.services)
    }

    /// Leave the environment. The participant receives no further ticks.
    ///
    /// # Errors
    ///
    /// See [`EnvironmentConnector::deregister`].
    pub fn deregister(&self) -> Result<(), EnvironmentError> {
        self.connector.deregister(self.id, &self.key)
    }
}

/// An acting agent driven once per tick.
pub trait Participant<T: Time = IntegerTime>: Send {
    /// The participant's identifier.
    fn id(&self) -> ParticipantId;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Called once, right after registration.
    ///
    /// The participant should keep `handle` for use in [`step`](Self::step).
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError`] if the participant cannot start; the
    /// driver then deregisters it.
    fn initialise(&mut self, handle: ParticipantHandle) -> Result<(), ComponentError>;

    /// Advance one tick.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError`] on failure; the driver applies its
    /// component failure policy.
    fn step(&mut self, ctx: &TickContext<T>) -> Result<(), ComponentError>;
}

/// A time-driven observer with service discovery only.
pub trait Plugin<T: Time = IntegerTime>: Send {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Called once when the plugin is added to a simulation.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError`] if the plugin cannot start.
    fn initialise(&mut self, _manager: &PluginManager) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Run once per tick, after every participant has stepped.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError`] on failure; the driver applies its
    /// component failure policy.
    fn execute(&mut self, ctx: &TickContext<T>) -> Result<(), ComponentError>;

    /// Called exactly once when the run completes normally.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError`] if final work (flushing, closing) fails.
    fn on_simulation_complete(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }
}

/// Creates participants from an identifier and a name.
pub trait ParticipantFactory<T: Time = IntegerTime> {
    /// Build a participant. It is registered and initialised by the caller.
    fn create(&mut self, id: ParticipantId, name: &str) -> Box<dyn Participant<T>>;
}

impl<T, F> ParticipantFactory<T> for F
where
    T: Time,
    F: FnMut(ParticipantId, &str) -> Box<dyn Participant<T>>,
{
    fn create(&mut self, id: ParticipantId, name: &str) -> Box<dyn Participant<T>> {
        self(id, name)
    }
}
