//! Clock, time-step driver, and run loop for the Lockstep coordination kernel.
//!
//! This crate owns simulation time. A [`Simulation`] advances its [`Clock`]
//! one unit per tick, steps every participant, then every plugin, and
//! nothing from the next tick starts before the current one has finished.
//! [`run_simulation`] wraps the tick loop with operator controls and run
//! boundaries.
//!
//! # Modules
//!
//! - [`clock`] -- The [`Clock`] over any [`Time`](lockstep_types::Time)
//! - [`config`] -- Configuration loading from `lockstep-config.yaml` into
//!   strongly-typed structs.
//! - [`operator`] -- [`OperatorState`] for pause, resume, speed, and stop
//! - [`participant`] -- The [`Participant`] and [`Plugin`] component traits
//! - [`runner`] -- The bounded [`run_simulation`] loop
//! - [`tick`] -- The [`Simulation`] time-step driver

pub mod clock;
pub mod config;
pub mod operator;
pub mod participant;
pub mod runner;
pub mod tick;

pub use clock::{Clock, ClockError};
pub use config::{
    ConfigError, DriverConfig, ExecutionMode, FailurePolicy, KernelConfig, LogFormat,
    LoggingConfig, ScenarioConfig, SimulationBoundsConfig,
};
pub use operator::{OperatorState, SimulationEndReason, SimulationStatus};
pub use participant::{
    ComponentError, Participant, ParticipantFactory, ParticipantHandle, Plugin, TickContext,
};
pub use runner::{
    NoOpCallback, RunnerError, SimulationResult, TickCallback, log_simulation_end, run_simulation,
};
pub use tick::{ComponentFailure, ComponentRef, DriverStatus, Simulation, TickError, TickSummary};
