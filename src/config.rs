//! Arbitration tunables.

use std::time::Duration;

/// How long an undecided touch sequence may stay undecided before it is
/// rejected automatically.
pub const DEFAULT_AUTODENY_TIMEOUT: Duration = Duration::from_millis(150);

/// How far a touch may travel in either axis, in device units, while
/// undecided before it stops counting as a tap and is rejected.
pub const DEFAULT_DRAG_THRESHOLD: f64 = 30.;

/// Input arbitration tunables.
///
/// Passed explicitly into [`Dispatcher::new`](crate::Dispatcher::new); there
/// is no ambient global configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub autodeny_timeout: Duration,
    pub drag_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            autodeny_timeout: DEFAULT_AUTODENY_TIMEOUT,
            drag_threshold: DEFAULT_DRAG_THRESHOLD,
        }
    }
}
