//! Time-step driver: the lockstep loop that advances a run one tick at a time.
//!
//! Each tick runs through these steps:
//!
//! 1. **Advance** -- increment the [`Clock`]; every component sees the same
//!    value for the whole tick.
//! 2. **Open** -- open the connector's action window through the
//!    [`TickGate`].
//! 3. **Participants** -- step every registered, non-failed participant in
//!    registration order, sequentially or on scoped worker threads per
//!    [`ExecutionMode`]. All of them return before the driver moves on.
//! 4. **Plugins** -- execute every non-failed plugin in registration order.
//! 5. **Close** -- close the action window and collect action statistics.
//!
//! Nothing from tick N+1 starts before every effect of tick N has
//! happened. Failures are handled per [`DriverConfig`]: a failing hook
//! either aborts the run or marks the component failed, and handler
//! failures during the tick optionally abort the run at step 5.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;

use lockstep_env::{
    ActionFailure, ActionStats, AuthorizationKey, EnvironmentConnector, EnvironmentError,
    EnvironmentRegistrationRequest, TickGate, panic_message,
};
use lockstep_types::{IntegerTime, ParticipantId, PluginId, Time};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, ClockError};
use crate::config::{DriverConfig, ExecutionMode, FailurePolicy};
use crate::participant::{
    ComponentError, Participant, ParticipantFactory, ParticipantHandle, Plugin, TickContext,
};

/// Identifies a participant or plugin in failures and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentRef {
    /// A participant.
    Participant {
        /// The participant's identifier.
        id: ParticipantId,
        /// The participant's name.
        name: String,
    },
    /// A plugin.
    Plugin {
        /// The plugin's identifier.
        id: PluginId,
        /// The plugin's name.
        name: String,
    },
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Participant { id, name } => write!(f, "participant `{name}` ({id})"),
            Self::Plugin { id, name } => write!(f, "plugin `{name}` ({id})"),
        }
    }
}

/// A component hook that failed and was excluded from later ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentFailure {
    /// The failing component.
    pub component: ComponentRef,
    /// Description of the failure.
    pub reason: String,
}

/// Lifecycle of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DriverStatus {
    /// No tick has run yet.
    NotStarted,
    /// The given tick was the last one to run.
    Running {
        /// Most recent tick.
        tick: u64,
    },
    /// The run finished normally after the given number of ticks.
    Completed {
        /// Ticks executed.
        ticks: u64,
    },
    /// The run was aborted during the given tick.
    Aborted {
        /// Tick during which the run stopped.
        tick: u64,
    },
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not started"),
            Self::Running { tick } => write!(f, "running (tick {tick})"),
            Self::Completed { ticks } => write!(f, "completed after {ticks} ticks"),
            Self::Aborted { tick } => write!(f, "aborted at tick {tick}"),
        }
    }
}

/// Errors that can occur while setting up or driving a run.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The clock could not advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// Registering a participant failed.
    #[error("environment error: {source}")]
    Environment {
        /// The underlying environment error.
        #[from]
        source: EnvironmentError,
    },

    /// A component failed to initialise and was not added.
    #[error("{component} failed to initialise: {source}")]
    Initialise {
        /// The component.
        component: ComponentRef,
        /// The hook's error.
        source: Box<ComponentError>,
    },

    /// A component hook failed under the abort policy.
    #[error("{component} failed at tick {tick}: {source}")]
    ComponentFailed {
        /// The tick in which the failure happened.
        tick: u64,
        /// The component.
        component: ComponentRef,
        /// The hook's error.
        source: Box<ComponentError>,
    },

    /// An action handler failed under the abort policy.
    #[error(
        "handler `{}` failed on action `{}` from {} at tick {tick}: {}",
        failure.handler, failure.tag, failure.actor, failure.reason
    )]
    ActionFailed {
        /// The tick in which the failure happened.
        tick: u64,
        /// The first handler failure of the tick.
        failure: Box<ActionFailure>,
    },

    /// One or more plugins failed while completing the run.
    #[error("{} plugin(s) failed on completion", failures.len())]
    Completion {
        /// Every completion failure.
        failures: Vec<ComponentFailure>,
    },

    /// The run has already completed or aborted.
    #[error("simulation is {status}")]
    NotRunnable {
        /// The current status.
        status: DriverStatus,
    },
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickSummary<T: Time = IntegerTime> {
    /// The tick number that was executed.
    pub tick: u64,
    /// Clock value during the tick.
    pub time: T,
    /// Participants whose step hook ran.
    pub participants_stepped: usize,
    /// Plugins whose execute hook ran.
    pub plugins_executed: usize,
    /// Participants still registered at the end of the tick.
    pub participants_registered: usize,
    /// Action dispatch counts for the tick.
    pub actions: ActionStats,
    /// Components that failed this tick under the continue policy.
    pub failures: Vec<ComponentFailure>,
}

struct ParticipantSlot<T: Time> {
    id: ParticipantId,
    // The key issued when this instance registered. The slot is driven
    // only while this key is live, so a later registration of the same id
    // does not revive it.
    key: AuthorizationKey,
    name: String,
    participant: Box<dyn Participant<T>>,
    failed: bool,
}

impl<T: Time> ParticipantSlot<T> {
    fn component(&self) -> ComponentRef {
        ComponentRef::Participant {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

struct PluginSlot<T: Time> {
    id: PluginId,
    name: String,
    plugin: Box<dyn Plugin<T>>,
    failed: bool,
}

impl<T: Time> PluginSlot<T> {
    fn component(&self) -> ComponentRef {
        ComponentRef::Plugin {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// A run: clock, environment, and the components it drives.
pub struct Simulation<T: Time = IntegerTime> {
    clock: Clock<T>,
    connector: Arc<EnvironmentConnector>,
    gate: TickGate,
    participants: Vec<ParticipantSlot<T>>,
    plugins: Vec<PluginSlot<T>>,
    driver: DriverConfig,
    status: DriverStatus,
}

impl<T: Time> Simulation<T> {
    /// Create a run over a built environment, with the clock at
    /// [`Time::initial`].
    pub fn new(connector: Arc<EnvironmentConnector>, gate: TickGate, driver: DriverConfig) -> Self {
        Self {
            clock: Clock::new(),
            connector,
            gate,
            participants: Vec::new(),
            plugins: Vec::new(),
            driver,
            status: DriverStatus::NotStarted,
        }
    }

    /// Replace the clock before the run starts.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock<T>) -> Self {
        self.clock = clock;
        self
    }

    /// The run's clock.
    pub const fn clock(&self) -> &Clock<T> {
        &self.clock
    }

    /// The environment connector.
    pub const fn connector(&self) -> &Arc<EnvironmentConnector> {
        &self.connector
    }

    /// Current lifecycle state.
    pub const fn status(&self) -> &DriverStatus {
        &self.status
    }

    /// Driver configuration.
    pub const fn driver_config(&self) -> &DriverConfig {
        &self.driver
    }

    /// Participants that will be stepped next tick, in registration order.
    pub fn active_participants(&self) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .filter(|slot| !slot.failed && self.connector.is_current(slot.id, &slot.key))
            .map(|slot| slot.id)
            .collect()
    }

    /// Names of plugins that will be executed next tick.
    pub fn active_plugins(&self) -> Vec<&str> {
        self.plugins
            .iter()
            .filter(|slot| !slot.failed)
            .map(|slot| slot.name.as_str())
            .collect()
    }

    /// Register a participant and initialise it.
    ///
    /// Participants may be added before the first tick or between ticks;
    /// they are stepped from the next tick on.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Environment`] if registration is refused,
    /// [`TickError::Initialise`] if the participant's `initialise` hook
    /// fails (it is deregistered again), or [`TickError::NotRunnable`] if
    /// the run has ended.
    pub fn add_participant(
        &mut self,
        mut participant: Box<dyn Participant<T>>,
    ) -> Result<ParticipantId, TickError> {
        self.ensure_runnable()?;
        let id = participant.id();
        let name = participant.name().to_owned();

        let registration = self
            .connector
            .register(EnvironmentRegistrationRequest::new(id, name.clone()))?;
        let key = registration.key.clone();
        let handle = ParticipantHandle::new(Arc::clone(&self.connector), registration);

        if let Err(source) = guarded(|| participant.initialise(handle)) {
            warn!(participant = %id, name = %name, error = %source, "Participant failed to initialise");
            if let Err(err) = self.connector.deregister(id, &key) {
                debug!(participant = %id, error = %err, "Participant already gone after failed initialise");
            }
            return Err(TickError::Initialise {
                component: ComponentRef::Participant { id, name },
                source: Box::new(source),
            });
        }

        debug!(participant = %id, name = %name, "Participant added");
        self.participants.push(ParticipantSlot {
            id,
            key,
            name,
            participant,
            failed: false,
        });
        Ok(id)
    }

    /// Create, register, and initialise one participant per name.
    ///
    /// Stops at the first failure; participants added before it stay.
    ///
    /// # Errors
    ///
    /// See [`add_participant`](Self::add_participant).
    pub fn spawn_participants<F, I, S>(
        &mut self,
        factory: &mut F,
        names: I,
    ) -> Result<Vec<ParticipantId>, TickError>
    where
        F: ParticipantFactory<T> + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids = Vec::new();
        for name in names {
            let participant = factory.create(ParticipantId::new(), name.as_ref());
            ids.push(self.add_participant(participant)?);
        }
        info!(count = ids.len(), "Participants spawned");
        Ok(ids)
    }

    /// Add a plugin and initialise it with a [`PluginManager`].
    ///
    /// [`PluginManager`]: lockstep_env::PluginManager
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Initialise`] if the plugin's `initialise` hook
    /// fails, or [`TickError::NotRunnable`] if the run has ended.
    pub fn add_plugin(&mut self, mut plugin: Box<dyn Plugin<T>>) -> Result<PluginId, TickError> {
        self.ensure_runnable()?;
        let id = PluginId::new();
        let name = plugin.name().to_owned();
        let manager = self.connector.plugin_manager();

        if let Err(source) = guarded(|| plugin.initialise(&manager)) {
            warn!(plugin = %name, error = %source, "Plugin failed to initialise");
            return Err(TickError::Initialise {
                component: ComponentRef::Plugin { id, name },
                source: Box::new(source),
            });
        }

        debug!(plugin = %name, %id, "Plugin added");
        self.plugins.push(PluginSlot {
            id,
            name,
            plugin,
            failed: false,
        });
        Ok(id)
    }

    /// Execute one complete tick.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Clock`] if the clock cannot advance,
    /// [`TickError::ComponentFailed`] or [`TickError::ActionFailed`] when
    /// the abort policy applies, or [`TickError::NotRunnable`] if the run
    /// has ended. In every case but the last the run is now aborted.
    pub fn run_tick(&mut self) -> Result<TickSummary<T>, TickError> {
        self.ensure_runnable()?;

        let time = match self.clock.increment() {
            Ok(time) => time,
            Err(source) => return Err(self.abort(self.clock.ticks(), source.into())),
        };
        let tick = self.clock.ticks();
        self.status = DriverStatus::Running { tick };
        let ctx = TickContext { tick, time };

        self.gate.open(tick);
        debug!(tick, time = %ctx.time, "Tick started");

        // Participants that left since the last tick are dropped.
        let connector = Arc::clone(&self.connector);
        self.participants
            .retain(|slot| connector.is_current(slot.id, &slot.key));

        let mut failures = Vec::new();

        // --- Participants (barrier: every step has returned) ---
        let results = self.step_participants(&ctx);
        let participants_stepped = results.len();
        for (index, result) in results {
            let Err(source) = result else { continue };
            let Some(slot) = self.participants.get_mut(index) else {
                continue;
            };
            let component = slot.component();
            match self.driver.component_failure {
                FailurePolicy::Abort => {
                    return Err(self.abort(
                        tick,
                        TickError::ComponentFailed {
                            tick,
                            component,
                            source: Box::new(source),
                        },
                    ));
                }
                FailurePolicy::Continue => {
                    slot.failed = true;
                    warn!(tick, %component, error = %source, "Participant failed; excluded from later ticks");
                    failures.push(ComponentFailure {
                        component,
                        reason: source.to_string(),
                    });
                }
            }
        }

        // --- Plugins ---
        let mut plugins_executed: usize = 0;
        let mut abort_with = None;
        for slot in self.plugins.iter_mut().filter(|slot| !slot.failed) {
            plugins_executed = plugins_executed.saturating_add(1);
            let Err(source) = guarded(|| slot.plugin.execute(&ctx)) else {
                continue;
            };
            let component = slot.component();
            match self.driver.component_failure {
                FailurePolicy::Abort => {
                    abort_with = Some(TickError::ComponentFailed {
                        tick,
                        component,
                        source: Box::new(source),
                    });
                    break;
                }
                FailurePolicy::Continue => {
                    slot.failed = true;
                    warn!(tick, %component, error = %source, "Plugin failed; excluded from later ticks");
                    failures.push(ComponentFailure {
                        component,
                        reason: source.to_string(),
                    });
                }
            }
        }
        if let Some(err) = abort_with {
            return Err(self.abort(tick, err));
        }

        // --- Close ---
        let actions = self.gate.close();
        if self.driver.action_failure == FailurePolicy::Abort {
            if let Some(failure) = actions.failures.first() {
                let err = TickError::ActionFailed {
                    tick,
                    failure: Box::new(failure.clone()),
                };
                return Err(self.abort(tick, err));
            }
        }

        let participants_registered = self.connector.registered_participants().len();
        info!(
            tick,
            time = %ctx.time,
            participants_stepped,
            plugins_executed,
            applied = actions.applied,
            rejected = actions.rejected,
            failed = actions.failed,
            refused = actions.refused,
            "Tick complete"
        );

        Ok(TickSummary {
            tick,
            time: ctx.time,
            participants_stepped,
            plugins_executed,
            participants_registered,
            actions,
            failures,
        })
    }

    /// Complete the run and call `on_simulation_complete` on every plugin
    /// that has not failed.
    ///
    /// Calling this again after completion does nothing, so each plugin's
    /// completion hook runs exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Completion`] listing the plugins whose hook
    /// failed (every hook is still called), or [`TickError::NotRunnable`]
    /// if the run was aborted.
    pub fn finish(&mut self) -> Result<(), TickError> {
        match self.status {
            DriverStatus::Completed { .. } => return Ok(()),
            DriverStatus::Aborted { .. } => {
                return Err(TickError::NotRunnable {
                    status: self.status.clone(),
                });
            }
            DriverStatus::NotStarted | DriverStatus::Running { .. } => {}
        }

        let ticks = self.clock.ticks();
        self.status = DriverStatus::Completed { ticks };
        self.gate.close();

        let mut failures = Vec::new();
        for slot in self.plugins.iter_mut().filter(|slot| !slot.failed) {
            if let Err(source) = guarded(|| slot.plugin.on_simulation_complete()) {
                let component = slot.component();
                warn!(%component, error = %source, "Plugin failed on completion");
                failures.push(ComponentFailure {
                    component,
                    reason: source.to_string(),
                });
            }
        }

        info!(ticks, plugins = self.plugins.len(), "Simulation complete");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TickError::Completion { failures })
        }
    }

    fn step_participants(
        &mut self,
        ctx: &TickContext<T>,
    ) -> Vec<(usize, Result<(), ComponentError>)> {
        let mode = self.driver.execution;
        let active = self
            .participants
            .iter_mut()
            .enumerate()
            .filter(|(_, slot)| !slot.failed);

        match mode {
            ExecutionMode::Sequential => active
                .map(|(index, slot)| (index, guarded(|| slot.participant.step(ctx))))
                .collect(),
            ExecutionMode::Concurrent => thread::scope(|scope| {
                let mut workers = Vec::new();
                for (index, slot) in active {
                    let worker = scope.spawn(move || guarded(|| slot.participant.step(ctx)));
                    workers.push((index, worker));
                }
                workers
                    .into_iter()
                    .map(|(index, worker)| {
                        let result = worker.join().unwrap_or_else(|panic| {
                            Err(ComponentError::Panicked {
                                message: panic_message(panic.as_ref()),
                            })
                        });
                        (index, result)
                    })
                    .collect()
            }),
        }
    }

    fn abort(&mut self, tick: u64, err: TickError) -> TickError {
        self.gate.close();
        self.status = DriverStatus::Aborted { tick };
        warn!(tick, error = %err, "Simulation aborted");
        err
    }

    fn ensure_runnable(&self) -> Result<(), TickError> {
        match self.status {
            DriverStatus::Completed { .. } | DriverStatus::Aborted { .. } => {
                Err(TickError::NotRunnable {
                    status: self.status.clone(),
                })
            }
            DriverStatus::NotStarted | DriverStatus::Running { .. } => Ok(()),
        }
    }
}

impl<T: Time> fmt::Debug for Simulation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("clock", &self.clock)
            .field("status", &self.status)
            .field("participants", &self.participants.len())
            .field("plugins", &self.plugins.len())
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

/// Run a component hook, turning a panic into [`ComponentError::Panicked`].
fn guarded<F>(hook: F) -> Result<(), ComponentError>
where
    F: FnOnce() -> Result<(), ComponentError>,
{
    catch_unwind(AssertUnwindSafe(hook)).unwrap_or_else(|panic| {
        Err(ComponentError::Panicked {
            message: panic_message(panic.as_ref()),
        })
    })
}
