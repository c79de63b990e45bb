//! The async wrapper: run a routine in its own suspension context and hand
//! back a promise for its eventual outcome, immediately.

use crate::fiber::{Fiber, Payload, StartOutcome};
use crate::promise::{Deferred, Promise};
use crate::tracing_compat::debug;

/// Runs `body` inside a fresh suspension context and returns a promise for
/// its terminal outcome. The caller never blocks, even though the body may
/// use [`crate::wait`] internally.
///
/// - A body that returns or fails without suspending produces an
///   already-settled promise.
/// - Otherwise the promise settles when the context terminates.
/// - Cancelling the returned promise forwards cancellation to whichever
///   promise the context is parked on at that moment. The body observes it
///   as a cancellation error raised at its `wait` call and may catch it and
///   await something else, re-targeting any later cancel request. The
///   returned promise settles only once the body exits.
pub fn spawn<F>(body: F) -> Promise
where
    F: FnOnce() -> Payload + Send + 'static,
{
    match Fiber::start(body) {
        StartOutcome::Done(Ok(value)) => Promise::fulfilled(value),
        StartOutcome::Done(Err(error)) => Promise::rejected(error),
        StartOutcome::Suspended(fiber) => {
            debug!(context = %fiber.id(), "routine suspended; bridging to outer promise");
            let weak = fiber.downgrade();
            let deferred = Deferred::with_canceller(move |_| {
                if let Some(fiber) = weak.upgrade() {
                    fiber.cancel_awaited();
                }
            });
            let outer = deferred.clone();
            fiber.set_on_terminate(move |outcome| match outcome {
                Ok(value) => outer.resolve(value),
                Err(error) => outer.reject(error),
            });
            deferred.promise()
        }
    }
}
