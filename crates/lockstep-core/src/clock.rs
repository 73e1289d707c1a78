//! Logical clock for a simulation run.
//!
//! The clock is the single source of truth for simulation time. Only the
//! time-step driver advances it, exactly one discrete unit per tick, so
//! every participant observes the same value during a tick.
//!
//! Besides the time value itself the clock counts how many ticks have run.
//! For [`IntegerTime`] the two coincide; other [`Time`] representations may
//! start elsewhere or step irregularly, and the tick count stays a plain
//! `u64` for logs and tables.

use std::cmp::Ordering;

use lockstep_types::{IntegerTime, Time};

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// The time representation cannot advance past its current value.
    #[error("clock overflow: cannot advance beyond {current}")]
    Overflow {
        /// The value the clock is stuck at.
        current: String,
    },
}

/// Simulation clock over a [`Time`] representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock<T: Time = IntegerTime> {
    /// Current time value.
    current: T,

    /// Number of increments since the clock was created.
    ticks: u64,
}

impl<T: Time> Clock<T> {
    /// Create a clock at [`Time::initial`].
    pub fn new() -> Self {
        Self::starting_at(T::initial())
    }

    /// Create a clock at an explicit starting value (useful for testing
    /// and for resuming a run).
    pub const fn starting_at(current: T) -> Self {
        Self { current, ticks: 0 }
    }

    /// Advance by one discrete unit and return the new value.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Overflow`] if the time representation cannot
    /// advance; the clock is left unchanged.
    pub fn increment(&mut self) -> Result<T, ClockError> {
        let next = self.current.next().ok_or_else(|| ClockError::Overflow {
            current: self.current.to_string(),
        })?;
        let ticks = self.ticks.checked_add(1).ok_or_else(|| ClockError::Overflow {
            current: self.current.to_string(),
        })?;
        self.current = next;
        self.ticks = ticks;
        Ok(self.current.clone())
    }

    /// Return the current time value.
    pub const fn current(&self) -> &T {
        &self.current
    }

    /// Return how many ticks have run.
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Total order over time values.
    pub fn compare(a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

impl<T: Time> Default for Clock<T> {
    fn default() -> Self {
        Self::new()
    }
}
