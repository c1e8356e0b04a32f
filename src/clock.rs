//! Monotonic time source, overridable for tests.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::utils::get_monotonic_time;

/// Monotonic clock handle.
///
/// Clones share the same time source. The default clock reads
/// `CLOCK_MONOTONIC`; a clock created with [`Clock::with_time`] is driven
/// manually, which lets tests step through timeouts without sleeping.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    manual: Option<Rc<Cell<Duration>>>,
}

impl Clock {
    /// Creates a manually driven clock starting at `time`.
    pub fn with_time(time: Duration) -> Self {
        Self {
            manual: Some(Rc::new(Cell::new(time))),
        }
    }

    /// Returns the current time.
    pub fn now(&self) -> Duration {
        match &self.manual {
            Some(time) => time.get(),
            None => get_monotonic_time(),
        }
    }

    /// Sets the time on a manually driven clock.
    ///
    /// Does nothing on a real-time clock.
    pub fn set_time(&self, time: Duration) {
        if let Some(cell) = &self.manual {
            cell.set(time);
        }
    }

    /// Advances a manually driven clock.
    pub fn advance(&self, by: Duration) {
        if let Some(cell) = &self.manual {
            cell.set(cell.get() + by);
        }
    }
}
