//! Logical time.
//!
//! Time in a run is discrete and totally ordered. The kernel only ever
//! needs three things from a time value: a starting point, the next value,
//! and a comparison. Alternative representations (calendar time, vector
//! clocks projected onto a total order) implement [`Time`]; the default is
//! [`IntegerTime`], a tick counter starting at zero.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A discrete, totally ordered logical time value.
///
/// Implementations must guarantee that `next()` is strictly greater than
/// `self` whenever it returns `Some`.
pub trait Time: Clone + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// The value at the start of a run, before any tick has executed.
    fn initial() -> Self;

    /// The value one discrete step later, or `None` if the representation
    /// cannot advance any further.
    fn next(&self) -> Option<Self>;
}

/// Integer tick time, starting at 0.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IntegerTime(u64);

impl IntegerTime {
    /// Create a time value at the given tick.
    pub const fn new(tick: u64) -> Self {
        Self(tick)
    }

    /// Return the tick number.
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl Time for IntegerTime {
    fn initial() -> Self {
        Self(0)
    }

    fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for IntegerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for IntegerTime {
    fn from(tick: u64) -> Self {
        Self(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_time_starts_at_zero() {
        assert_eq!(IntegerTime::initial().value(), 0);
    }

    #[test]
    fn next_is_strictly_greater() {
        let t = IntegerTime::new(41);
        let n = t.next();
        assert_eq!(n, Some(IntegerTime::new(42)));
        assert!(n.is_some_and(|n| n > t));
    }

    #[test]
    fn next_at_max_is_none() {
        assert_eq!(IntegerTime::new(u64::MAX).next(), None);
    }
}
