//! Suspension engine: parkable, resumable logical threads of execution.
//!
//! A context runs a body until it returns, fails, or parks itself with
//! [`suspend`]. Parking hands control back to whoever called
//! [`Fiber::start`] or [`Fiber::resume`]; resuming delivers a payload that
//! becomes `suspend`'s return value. A context in any state other than
//! `Suspended` cannot be resumed (`InvalidState`).
//!
//! # Host capability
//!
//! Each context owns a dedicated OS thread, and every control transfer is a
//! blocking rendezvous over a channel: the resuming side parks itself until
//! the context parks or terminates, so exactly one logical thread is ever
//! unparked. The concurrency model stays single-threaded and cooperative;
//! the threads are only the host's mechanism for resumable stacks.
//!
//! # Reclamation
//!
//! The context thread holds only weak references to the shared record. When
//! every [`Fiber`] handle drops while the context is parked, the resume
//! channel disconnects, `suspend` returns an abandoned-cancellation error,
//! and the thread unwinds on its own.

use crate::error::{Error, Result};
use crate::promise::{Promise, WeakPromise};
use crate::tracing_compat::{debug, trace};
use crate::types::{CancelReason, ContextId, Value};
use core::fmt;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread;

/// Lifecycle status of a suspension context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The context body is executing.
    Running,
    /// The context is parked at a `suspend` call.
    Suspended,
    /// A resume payload has been delivered but the body has not yet
    /// re-entered `Running`.
    Resumed,
    /// The body returned, failed, or panicked; the context is finished.
    Terminated,
}

/// The payload delivered into a parked context, and the terminal outcome a
/// context body produces: a value or a typed error.
pub type Payload = Result<Value>;

enum Event {
    Parked,
    Done(Payload),
}

type TerminateFn = Box<dyn FnOnce(Payload) + Send>;

struct Shared {
    id: ContextId,
    status: Mutex<Status>,
    /// Weak so a pending awaited promise and the context cannot keep each
    /// other alive through the promise's callback list.
    awaited: Mutex<Option<WeakPromise>>,
    on_terminate: Mutex<Option<TerminateFn>>,
    resume_tx: Sender<Payload>,
    event_rx: Receiver<Event>,
}

/// A handle to a suspension context.
#[derive(Clone)]
pub struct Fiber {
    shared: Arc<Shared>,
}

/// A weak handle to a suspension context.
#[derive(Clone)]
pub struct WeakFiber {
    shared: Weak<Shared>,
}

/// What `start` produced: a terminal outcome (the body never suspended) or
/// a parked context.
pub enum StartOutcome {
    /// The body ran to completion without suspending.
    Done(Payload),
    /// The body parked itself; resume it through the handle.
    Suspended(Fiber),
}

struct TlsContext {
    shared: Weak<Shared>,
    resume_rx: Receiver<Payload>,
    event_tx: Sender<Event>,
}

thread_local! {
    static CURRENT: RefCell<Option<TlsContext>> = const { RefCell::new(None) };
}

impl Fiber {
    /// Creates a new context and runs `body` synchronously inside it until
    /// the body returns, fails, or calls [`suspend`].
    pub fn start<F>(body: F) -> StartOutcome
    where
        F: FnOnce() -> Payload + Send + 'static,
    {
        let id = ContextId::next();
        let (resume_tx, resume_rx) = bounded::<Payload>(1);
        let (event_tx, event_rx) = bounded::<Event>(0);
        let shared = Arc::new(Shared {
            id,
            status: Mutex::new(Status::Running),
            awaited: Mutex::new(None),
            on_terminate: Mutex::new(None),
            resume_tx,
            event_rx,
        });
        let weak = Arc::downgrade(&shared);
        let spawned = thread::Builder::new()
            .name(format!("yieldpoint-{id}"))
            .spawn(move || run_context(&weak, resume_rx, event_tx, body));
        if let Err(e) = spawned {
            return StartOutcome::Done(Err(Error::internal(format!(
                "failed to spawn context thread: {e}"
            ))));
        }
        debug!(context = %id, "context started");
        match shared.event_rx.recv() {
            Ok(Event::Parked) => StartOutcome::Suspended(Self { shared }),
            Ok(Event::Done(outcome)) => {
                *shared.status.lock() = Status::Terminated;
                trace!(context = %id, "context finished without suspending");
                StartOutcome::Done(outcome)
            }
            Err(_) => StartOutcome::Done(Err(Error::internal(
                "context thread disconnected before reporting",
            ))),
        }
    }

    /// Delivers `payload` to a suspended context and runs it until its next
    /// parking point or termination.
    ///
    /// Returns the terminal outcome if the context terminated, `None` if it
    /// parked again. Fails with `InvalidState` unless the context is
    /// currently `Suspended`. Safe to call from inside another context's
    /// settlement callback: the calling logical thread parks for the
    /// duration, so the two contexts never run concurrently.
    pub fn resume(&self, payload: Payload) -> Result<Option<Payload>> {
        {
            let mut status = self.shared.status.lock();
            if *status != Status::Suspended {
                return Err(Error::invalid_state(format!(
                    "cannot resume context {} in state {:?}",
                    self.shared.id, *status
                )));
            }
            *status = Status::Resumed;
        }
        trace!(context = %self.shared.id, "resuming context");
        self.shared
            .resume_tx
            .send(payload)
            .map_err(|_| Error::internal("context thread is gone"))?;
        match self.shared.event_rx.recv() {
            Ok(Event::Parked) => Ok(None),
            Ok(Event::Done(outcome)) => {
                *self.shared.status.lock() = Status::Terminated;
                debug!(context = %self.shared.id, "context terminated");
                let hook = self.shared.on_terminate.lock().take();
                if let Some(hook) = hook {
                    hook(outcome.clone());
                }
                Ok(Some(outcome))
            }
            Err(_) => Err(Error::internal(
                "context thread disconnected without reporting",
            )),
        }
    }

    /// Returns the context identifier.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.shared.id
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> Status {
        *self.shared.status.lock()
    }

    /// Records the promise this context is currently parked on, or clears
    /// the record. Cancellation of an outer wrapper promise forwards here.
    pub fn set_awaited(&self, promise: Option<&Promise>) {
        *self.shared.awaited.lock() = promise.map(Promise::downgrade);
    }

    /// Cancels the promise this context is currently parked on, if any.
    pub fn cancel_awaited(&self) {
        let awaited = self
            .shared
            .awaited
            .lock()
            .as_ref()
            .and_then(WeakPromise::upgrade);
        if let Some(promise) = awaited {
            trace!(context = %self.shared.id, "forwarding cancellation to awaited promise");
            promise.cancel();
        }
    }

    /// Installs a hook invoked with the terminal outcome when the context
    /// terminates through [`Fiber::resume`]. Used to bridge a context to an
    /// outer promise.
    pub fn set_on_terminate(&self, hook: impl FnOnce(Payload) + Send + 'static) {
        *self.shared.on_terminate.lock() = Some(Box::new(hook));
    }

    /// Downgrades to a weak handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakFiber {
        WeakFiber {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl WeakFiber {
    /// Upgrades back to a strong handle if the context is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Fiber> {
        self.shared.upgrade().map(|shared| Fiber { shared })
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fiber({}, {:?})", self.shared.id, self.status())
    }
}

/// Returns a handle to the context the calling code is running inside, if any.
#[must_use]
pub fn current() -> Option<Fiber> {
    CURRENT.with(|c| {
        c.borrow()
            .as_ref()
            .and_then(|tls| tls.shared.upgrade())
            .map(|shared| Fiber { shared })
    })
}

/// Parks the calling context and returns control to whoever called
/// `start`/`resume`.
///
/// When later resumed, returns the delivered payload: the value as `Ok`, or
/// the delivered error re-raised as `Err`. Fails with `InvalidState` when
/// called outside any context, and with an abandoned-cancellation error when
/// every handle to the context was dropped while it was parked.
pub fn suspend() -> Payload {
    let tls = CURRENT.with(|c| {
        c.borrow()
            .as_ref()
            .map(|t| (t.shared.clone(), t.resume_rx.clone(), t.event_tx.clone()))
    });
    let Some((weak, resume_rx, event_tx)) = tls else {
        return Err(Error::invalid_state(
            "suspend called outside a suspension context",
        ));
    };
    if let Some(shared) = weak.upgrade() {
        *shared.status.lock() = Status::Suspended;
        trace!(context = %shared.id, "context suspended");
    }
    if event_tx.send(Event::Parked).is_err() {
        return Err(Error::cancelled(CancelReason::abandoned()));
    }
    match resume_rx.recv() {
        Ok(payload) => {
            if let Some(shared) = weak.upgrade() {
                *shared.status.lock() = Status::Running;
            }
            payload
        }
        Err(_) => Err(Error::cancelled(CancelReason::abandoned())),
    }
}

fn run_context<F>(weak: &Weak<Shared>, resume_rx: Receiver<Payload>, event_tx: Sender<Event>, body: F)
where
    F: FnOnce() -> Payload + Send + 'static,
{
    CURRENT.with(|c| {
        *c.borrow_mut() = Some(TlsContext {
            shared: weak.clone(),
            resume_rx,
            event_tx: event_tx.clone(),
        });
    });
    let outcome = match catch_unwind(AssertUnwindSafe(body)) {
        Ok(payload) => payload,
        Err(panic) => Err(Error::from_panic(panic.as_ref())),
    };
    if let Some(shared) = weak.upgrade() {
        *shared.status.lock() = Status::Terminated;
    }
    // Fails only when the context was abandoned; nothing left to notify.
    let _ = event_tx.send(Event::Done(outcome));
    CURRENT.with(|c| c.borrow_mut().take());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::{Duration, Instant};

    #[test]
    fn body_without_suspend_completes_synchronously() {
        match Fiber::start(|| Ok(Value::Int(42))) {
            StartOutcome::Done(Ok(Value::Int(42))) => {}
            other => panic!("unexpected outcome: {:?}", outcome_tag(&other)),
        }
    }

    #[test]
    fn body_error_is_the_terminal_outcome() {
        match Fiber::start(|| Err(Error::user("boom"))) {
            StartOutcome::Done(Err(e)) => assert_eq!(e.message(), Some("boom")),
            other => panic!("unexpected outcome: {:?}", outcome_tag(&other)),
        }
    }

    #[test]
    fn suspend_returns_resumed_value() {
        let StartOutcome::Suspended(fiber) = Fiber::start(|| {
            let v = suspend()?;
            Ok(v)
        }) else {
            panic!("expected suspension");
        };
        assert_eq!(fiber.status(), Status::Suspended);
        let outcome = fiber.resume(Ok(Value::Int(7))).expect("resume failed");
        match outcome {
            Some(Ok(Value::Int(7))) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(fiber.status(), Status::Terminated);
    }

    #[test]
    fn suspend_reraises_resumed_error() {
        let StartOutcome::Suspended(fiber) = Fiber::start(|| {
            let v = suspend()?;
            Ok(v)
        }) else {
            panic!("expected suspension");
        };
        let outcome = fiber
            .resume(Err(Error::user("injected")))
            .expect("resume failed");
        match outcome {
            Some(Err(e)) => assert_eq!(e.message(), Some("injected")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn body_may_catch_injected_error_and_continue() {
        let StartOutcome::Suspended(fiber) = Fiber::start(|| {
            match suspend() {
                Ok(v) => Ok(v),
                Err(_) => suspend(),
            }
        }) else {
            panic!("expected suspension");
        };
        // First resume raises; the body catches and parks again.
        let parked = fiber.resume(Err(Error::user("first"))).expect("resume");
        assert!(parked.is_none());
        assert_eq!(fiber.status(), Status::Suspended);
        let outcome = fiber.resume(Ok(Value::Int(2))).expect("resume");
        assert!(matches!(outcome, Some(Ok(Value::Int(2)))));
    }

    #[test]
    fn resume_on_terminated_context_is_invalid_state() {
        let StartOutcome::Suspended(fiber) = Fiber::start(|| suspend()) else {
            panic!("expected suspension");
        };
        fiber.resume(Ok(Value::Null)).expect("resume failed");
        let err = fiber.resume(Ok(Value::Null)).expect_err("expected error");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn panic_in_body_becomes_panicked_outcome() {
        match Fiber::start(|| panic!("kaboom")) {
            StartOutcome::Done(Err(e)) => {
                assert!(e.is_panicked());
                assert_eq!(e.message(), Some("kaboom"));
            }
            other => panic!("unexpected outcome: {:?}", outcome_tag(&other)),
        }
    }

    #[test]
    fn suspend_outside_context_is_invalid_state() {
        let err = suspend().expect_err("expected error");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn resume_from_inside_another_context_is_safe() {
        let StartOutcome::Suspended(inner) = Fiber::start(|| suspend()) else {
            panic!("expected suspension");
        };
        let inner2 = inner.clone();
        let outcome = Fiber::start(move || {
            let nested = inner2.resume(Ok(Value::Int(5)))?;
            match nested {
                Some(Ok(v)) => Ok(v),
                other => Err(Error::internal(format!("unexpected: {other:?}"))),
            }
        });
        match outcome {
            StartOutcome::Done(Ok(Value::Int(5))) => {}
            other => panic!("unexpected outcome: {:?}", outcome_tag(&other)),
        }
        assert_eq!(inner.status(), Status::Terminated);
    }

    #[test]
    fn abandoned_context_unparks_with_cancellation() {
        let observed = Arc::new(Mutex::new(None));
        let obs = Arc::clone(&observed);
        let StartOutcome::Suspended(fiber) = Fiber::start(move || {
            let result = suspend();
            if let Err(e) = &result {
                *obs.lock() = e.cancel_reason().map(|r| r.kind);
            }
            result
        }) else {
            panic!("expected suspension");
        };
        drop(fiber);
        // The parked thread wakes asynchronously on channel disconnect.
        let deadline = Instant::now() + Duration::from_secs(5);
        while observed.lock().is_none() && Instant::now() < deadline {
            thread::yield_now();
        }
        assert_eq!(
            *observed.lock(),
            Some(crate::types::CancelKind::Abandoned)
        );
    }

    fn outcome_tag(outcome: &StartOutcome) -> &'static str {
        match outcome {
            StartOutcome::Done(Ok(_)) => "done-ok",
            StartOutcome::Done(Err(_)) => "done-err",
            StartOutcome::Suspended(_) => "suspended",
        }
    }
}
