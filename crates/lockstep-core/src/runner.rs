//! Run loop with operator controls.
//!
//! [`run_simulation`] drives [`Simulation::run_tick`] until a boundary is
//! reached, adding the control plane around it:
//!
//! - **Bounded runs**: stop after `max_ticks` or `max_real_time_seconds`
//! - **Pause/resume**: a controller can halt and continue the loop
//! - **Variable tick speed**: interval adjustable while running
//! - **Clean stop**: a controller can end the run between ticks
//!
//! Every normal end calls [`Simulation::finish`], so plugins see
//! `on_simulation_complete` exactly once. An aborted run does not.

use std::sync::Arc;

use lockstep_types::{IntegerTime, Time};
use tracing::{info, warn};

use crate::operator::{OperatorState, SimulationEndReason};
use crate::tick::{Simulation, TickError, TickSummary};

/// Errors that can occur during a run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick, or completing the run, failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Result of a run.
#[derive(Debug)]
pub struct SimulationResult<T: Time = IntegerTime> {
    /// The reason the run ended.
    pub end_reason: SimulationEndReason,
    /// The last tick summary, if any tick completed.
    pub final_summary: Option<TickSummary<T>>,
    /// Ticks executed by this call.
    pub total_ticks: u64,
}

/// Callback invoked after each tick completes.
///
/// Receives the tick summary and the simulation, between ticks, with no
/// participant running.
pub trait TickCallback<T: Time = IntegerTime>: Send {
    /// Called after a tick completes successfully.
    fn on_tick(&mut self, summary: &TickSummary<T>, simulation: &Simulation<T>);
}

/// A tick callback that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl<T: Time> TickCallback<T> for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary<T>, _simulation: &Simulation<T>) {}
}

/// Run the simulation until a boundary or a stop request ends it.
///
/// # Errors
///
/// Returns [`RunnerError`] if a tick aborts the run or a plugin fails on
/// completion.
pub async fn run_simulation<T: Time>(
    simulation: &mut Simulation<T>,
    operator: &Arc<OperatorState>,
    callback: &mut dyn TickCallback<T>,
) -> Result<SimulationResult<T>, RunnerError> {
    let mut last_summary: Option<TickSummary<T>> = None;
    let mut total_ticks: u64 = 0;

    info!(
        max_ticks = operator.max_ticks(),
        max_real_time_seconds = operator.max_real_time_seconds(),
        tick_interval_ms = operator.tick_interval_ms(),
        participants = simulation.active_participants().len(),
        plugins = simulation.active_plugins().len(),
        "Simulation starting"
    );

    let end_reason = loop {
        if operator.is_paused() {
            info!("Simulation paused, waiting for resume...");
            operator.wait_if_paused().await;
            info!("Simulation resumed");
        }

        if operator.is_stop_requested() {
            info!("Operator stop requested");
            break SimulationEndReason::OperatorStop;
        }

        if operator.time_limit_reached() {
            info!(
                max_seconds = operator.max_real_time_seconds(),
                elapsed = operator.elapsed_seconds(),
                "Real-time limit reached"
            );
            break SimulationEndReason::MaxRealTimeReached;
        }

        let summary = simulation.run_tick()?;
        total_ticks = total_ticks.saturating_add(1);

        callback.on_tick(&summary, simulation);

        // summary.tick is the tick that just ran: with max_ticks = 5 the
        // loop stops once tick 5 has completed.
        let limit_reached = operator.tick_limit_reached(summary.tick);
        last_summary = Some(summary);
        if limit_reached {
            info!(max_ticks = operator.max_ticks(), "Tick limit reached");
            break SimulationEndReason::MaxTicksReached;
        }

        let interval_ms = operator.tick_interval_ms();
        if interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
        }
    };

    operator.set_end_reason(end_reason).await;
    simulation.finish()?;

    Ok(SimulationResult {
        end_reason,
        final_summary: last_summary,
        total_ticks,
    })
}

/// Log how a run ended.
pub fn log_simulation_end<T: Time>(result: &SimulationResult<T>) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        final_tick = result.final_summary.as_ref().map(|s| s.tick),
        "Simulation ended"
    );

    if let Some(ref summary) = result.final_summary {
        info!(
            tick = summary.tick,
            time = %summary.time,
            participants = summary.participants_registered,
            applied = summary.actions.applied,
            failed = summary.actions.failed,
            "Final tick summary"
        );
    } else {
        warn!("Simulation ended with no ticks executed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lockstep_env::EnvironmentBuilder;

    use super::*;
    use crate::config::{DriverConfig, SimulationBoundsConfig};
    use crate::tick::DriverStatus;

    fn simulation() -> Simulation {
        let (connector, gate) = EnvironmentBuilder::new().build();
        Simulation::new(connector, gate, DriverConfig::default())
    }

    const fn bounds(max_ticks: u64) -> SimulationBoundsConfig {
        SimulationBoundsConfig {
            max_ticks,
            max_real_time_seconds: 0,
        }
    }

    #[tokio::test]
    async fn bounded_by_max_ticks() {
        let mut sim = simulation();
        let operator = Arc::new(OperatorState::new(0, &bounds(5)));

        let result = run_simulation(&mut sim, &operator, &mut NoOpCallback)
            .await
            .unwrap();

        assert_eq!(result.end_reason, SimulationEndReason::MaxTicksReached);
        assert_eq!(result.total_ticks, 5);
        assert_eq!(result.final_summary.unwrap().tick, 5);
        assert_eq!(sim.status(), &DriverStatus::Completed { ticks: 5 });
        assert_eq!(
            operator.end_reason().await,
            Some(SimulationEndReason::MaxTicksReached)
        );
    }

    #[tokio::test]
    async fn operator_stop_before_first_tick() {
        let mut sim = simulation();
        let operator = Arc::new(OperatorState::new(0, &bounds(0)));
        operator.request_stop();

        let result = run_simulation(&mut sim, &operator, &mut NoOpCallback)
            .await
            .unwrap();

        assert_eq!(result.end_reason, SimulationEndReason::OperatorStop);
        assert_eq!(result.total_ticks, 0);
        assert!(result.final_summary.is_none());
        assert_eq!(sim.status(), &DriverStatus::Completed { ticks: 0 });
    }

    #[tokio::test]
    async fn callback_can_stop_the_run() {
        struct StopAfter {
            operator: Arc<OperatorState>,
            ticks: u64,
            seen: u64,
        }
        impl TickCallback for StopAfter {
            fn on_tick(&mut self, summary: &TickSummary, simulation: &Simulation) {
                assert_eq!(simulation.clock().ticks(), summary.tick);
                self.seen = self.seen.saturating_add(1);
                if self.seen == self.ticks {
                    self.operator.request_stop();
                }
            }
        }

        let mut sim = simulation();
        let operator = Arc::new(OperatorState::new(0, &bounds(0)));
        let mut cb = StopAfter {
            operator: Arc::clone(&operator),
            ticks: 3,
            seen: 0,
        };

        let result = run_simulation(&mut sim, &operator, &mut cb).await.unwrap();

        assert_eq!(cb.seen, 3);
        assert_eq!(result.end_reason, SimulationEndReason::OperatorStop);
        assert_eq!(result.total_ticks, 3);
    }

    #[tokio::test]
    async fn finished_simulation_cannot_run_again() {
        let mut sim = simulation();
        let operator = Arc::new(OperatorState::new(0, &bounds(1)));
        run_simulation(&mut sim, &operator, &mut NoOpCallback)
            .await
            .unwrap();

        let again = run_simulation(&mut sim, &operator, &mut NoOpCallback).await;
        assert!(matches!(
            again,
            Err(RunnerError::Tick {
                source: TickError::NotRunnable { .. }
            })
        ));
    }
}
