//! Engine binary for the Lockstep coordination kernel.
//!
//! Loads configuration, installs logging, and runs the random-walker
//! scenario until a simulation bound is hit or the operator presses
//! Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the path given as the first argument
//!    (default `lockstep-config.yaml`), then apply environment overrides
//! 2. Initialize structured logging (tracing) from the `logging` section
//! 3. Create operator state from the simulation bounds
//! 4. Install the Ctrl-C handler, which requests a graceful stop
//! 5. Build the environment, spawn walkers, add plugins
//! 6. Run the simulation loop
//! 7. Log the result

mod error;
mod scenario;

use std::path::Path;
use std::sync::Arc;

use lockstep_core::{KernelConfig, LogFormat, LoggingConfig, OperatorState, log_simulation_end};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

const DEFAULT_CONFIG_PATH: &str = "lockstep-config.yaml";

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let (config, from_file) = load_config(Path::new(&path))?;

    init_logging(&config.logging)?;
    info!("lockstep-engine starting");
    if from_file {
        info!(path = %path, "Configuration loaded");
    } else {
        info!(path = %path, "Config file not found, using defaults");
    }
    info!(
        max_ticks = config.simulation.max_ticks,
        max_real_time_seconds = config.simulation.max_real_time_seconds,
        tick_interval_ms = config.driver.tick_interval_ms,
        execution = ?config.driver.execution,
        walkers = config.scenario.walkers,
        ring_size = config.scenario.ring_size,
        seed = config.scenario.seed,
        "Simulation configured"
    );

    let operator = Arc::new(OperatorState::new(
        config.driver.tick_interval_ms,
        &config.simulation,
    ));

    let signal_operator = Arc::clone(&operator);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping after the current tick");
                signal_operator.request_stop();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    let outcome = scenario::run(&config, &operator).await?;
    log_simulation_end(&outcome.result);
    info!(
        walkers = outcome.ring.positions.len(),
        occupied = outcome.ring.occupied(),
        collisions = outcome.ring.collisions,
        tally = outcome.tally,
        recorded_rows = outcome.recorded_rows,
        elapsed_seconds = operator.elapsed_seconds(),
        "lockstep-engine finished"
    );
    Ok(())
}

/// Load the config at `path`, or defaults if it does not exist.
///
/// Environment overrides are applied either way. The flag reports whether
/// the file was read.
fn load_config(path: &Path) -> Result<(KernelConfig, bool), EngineError> {
    if path.exists() {
        return Ok((KernelConfig::from_file(path)?, true));
    }
    let mut config = KernelConfig::default();
    config.apply_env_overrides()?;
    Ok((config, false))
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_logging(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| EngineError::Logging {
            message: format!("invalid log level {:?}: {e}", logging.level),
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}
