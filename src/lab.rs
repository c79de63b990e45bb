//! Deterministic loop driver with virtual time.
//!
//! [`LabDriver`] is the event loop the integration tests (and any embedder
//! without a real loop) pump through the [`Driver`] capability: a FIFO queue
//! of deferred callbacks plus a timer heap on virtual time. One unit of work
//! is one callback. Virtual time never advances while deferred work is
//! queued; when the queue drains, `run_one` jumps the clock to the next
//! timer deadline and fires that timer.

use crate::driver::{Callback, Driver};
use crate::timer::TimerHeap;
use crate::tracing_compat::trace;
use crate::types::Time;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// A deterministic single-queue event loop with virtual time.
#[derive(Default)]
pub struct LabDriver {
    queue: Mutex<VecDeque<Callback>>,
    timers: Mutex<TimerHeap>,
    now: Mutex<Time>,
}

impl LabDriver {
    /// Creates a new driver at virtual time zero with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        *self.now.lock()
    }

    /// Schedules a callback to fire once virtual time reaches now + `after`.
    pub fn add_timer(&self, after: Duration, cb: impl FnOnce() + Send + 'static) {
        let deadline = self.now().saturating_add(after);
        self.timers.lock().insert(deadline, Box::new(cb));
    }

    /// Returns true if no deferred work and no timers remain.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.lock().is_empty() && self.timers.lock().is_empty()
    }

    /// Runs queued work until the loop is idle. Returns the number of units run.
    pub fn run_until_idle(&self) -> usize {
        let mut units = 0;
        while self.run_one() {
            units += 1;
        }
        units
    }
}

impl Driver for LabDriver {
    fn defer(&self, cb: Callback) {
        self.queue.lock().push_back(cb);
    }

    // The callback is popped before it runs, so work deferred or timers
    // added from inside a callback (including re-entrant pumping) see a
    // consistent queue.
    fn run_one(&self) -> bool {
        let deferred = self.queue.lock().pop_front();
        if let Some(cb) = deferred {
            cb();
            return true;
        }
        let timer = self.timers.lock().pop_earliest();
        if let Some((deadline, cb)) = timer {
            {
                let mut now = self.now.lock();
                if *now < deadline {
                    *now = deadline;
                }
            }
            trace!(now = %self.now(), "virtual time advanced to timer deadline");
            cb();
            return true;
        }
        false
    }
}
