//! The event-loop capability consumed by the await operation.
//!
//! The core never owns an event loop; it consumes one through this narrow
//! interface. Only the top-level await fallback uses [`Driver::run_one`],
//! pumping exactly one unit of pending work at a time so it can stop the
//! instant its promise settles, even mid-queue.

/// A deferred unit of loop work.
pub type Callback = Box<dyn FnOnce() + Send>;

/// The event-loop capability.
pub trait Driver: Send + Sync {
    /// Schedules a callback for a future loop turn.
    fn defer(&self, cb: Callback);

    /// Runs exactly one unit of pending queued work.
    ///
    /// Returns false when the loop has nothing left to run.
    fn run_one(&self) -> bool;
}
