//! The await operation: park the calling logical thread until a promise
//! settles, without blocking the event loop.

use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::fiber;
use crate::promise::{Promise, Reason, Settlement};
use crate::tracing_compat::trace;
use crate::types::Value;

fn settled(settlement: Settlement) -> Result<Value> {
    settlement.map_err(Reason::into_error)
}

/// Waits for `promise` to settle, returning its fulfilment value or raising
/// its rejection.
///
/// A rejection with a typed error is raised unchanged; a rejection with a
/// raw non-error value is raised as `UnexpectedRejection` naming the value's
/// runtime type.
///
/// Three paths:
///
/// 1. **Fast path** — an already-settled promise returns or raises
///    synchronously; no loop unit runs and no callback is registered.
/// 2. **Inside a context** — the context records the promise as its awaited
///    target (so outer cancellation can reach it), registers resume
///    callbacks, and parks. The loop keeps servicing other work because the
///    top-level caller is the one pumping it.
/// 3. **Top level** — the calling thread is the implicit context: it pumps
///    `driver.run_one()` one unit at a time, re-checking settlement after
///    every unit so it stops the instant the promise settles, even with
///    more work queued.
pub fn wait(promise: &Promise, driver: &dyn Driver) -> Result<Value> {
    if let Some(settlement) = promise.settlement() {
        return settled(settlement);
    }

    if let Some(current) = fiber::current() {
        trace!(context = %current.id(), "parking context on pending promise");
        current.set_awaited(Some(promise));
        let on_fulfil = {
            let ctx = current.clone();
            move |value: Value| {
                ctx.set_awaited(None);
                let _ = ctx.resume(Ok(value));
            }
        };
        let on_reject = {
            let ctx = current.clone();
            move |reason: Reason| {
                ctx.set_awaited(None);
                let _ = ctx.resume(Err(reason.into_error()));
            }
        };
        promise.then(on_fulfil, on_reject);
        return fiber::suspend();
    }

    // Implicit top-level context: the calling thread pumps the loop itself.
    loop {
        if let Some(settlement) = promise.settlement() {
            return settled(settlement);
        }
        if !driver.run_one() {
            return Err(Error::internal(
                "event loop ran out of work while the promise is still pending",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lab::LabDriver;
    use crate::promise::Deferred;

    #[test]
    fn fast_path_returns_without_loop_work() {
        let driver = LabDriver::new();
        driver.defer(Box::new(|| {
            panic!("loop must not run on the fast path");
        }));
        let promise = Promise::fulfilled(Value::Int(42));
        assert_eq!(wait(&promise, &driver).expect("wait failed"), Value::Int(42));
    }

    #[test]
    fn fast_path_raises_error_unchanged() {
        let driver = LabDriver::new();
        let promise = Promise::rejected(Error::user("test").with_code(42));
        let err = wait(&promise, &driver).expect_err("expected rejection");
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.message(), Some("test"));
        assert_eq!(err.code(), 42);
    }

    #[test]
    fn raw_value_rejection_becomes_unexpected_rejection() {
        let driver = LabDriver::new();
        let promise = Promise::rejected_with(Value::Bool(false));
        let err = wait(&promise, &driver).expect_err("expected rejection");
        assert_eq!(err.kind(), ErrorKind::UnexpectedRejection);
        assert_eq!(
            err.message(),
            Some("promise rejected with unexpected value of type boolean")
        );
    }

    #[test]
    fn top_level_wait_pumps_until_settled() {
        let driver = LabDriver::new();
        let deferred = Deferred::new();
        let d = deferred.clone();
        driver.defer(Box::new(move || d.resolve(Value::Int(9))));
        assert_eq!(
            wait(&deferred.promise(), &driver).expect("wait failed"),
            Value::Int(9)
        );
    }

    #[test]
    fn idle_loop_with_pending_promise_is_an_error() {
        let driver = LabDriver::new();
        let deferred = Deferred::new();
        let err = wait(&deferred.promise(), &driver).expect_err("expected stall");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
