//! The promise collaborator: an eventual [`Value`] with at-most-once settlement.
//!
//! [`Promise`] is the read side (cloneable handle), [`Deferred`] the write
//! side. States are `Pending -> {Fulfilled | Rejected}`; settlement is
//! terminal and later settlement attempts are no-ops. Callbacks fire in
//! registration order and are drained out of the shared record before they
//! run, so no lock is ever held across user code: a callback may register
//! further callbacks or request cancellation reentrantly.
//!
//! Cancellation is idempotent. A pending promise with a canceller hook runs
//! it (the hook may reject with a custom error, settle, or retarget); a
//! pending promise without one rejects with a user cancellation reason; a
//! settled promise ignores the request.

use crate::error::Error;
use crate::types::{CancelReason, Value};
use core::fmt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// The payload a promise rejects with.
///
/// User routines reject with typed errors; the raw [`Reason::Value`] arm
/// exists because a collaborator may reject with any value, and the await
/// operation must then surface an `UnexpectedRejection` naming its type.
#[derive(Debug, Clone)]
pub enum Reason {
    /// A typed error; crosses the boundary unchanged.
    Error(Error),
    /// A raw non-error value.
    Value(Value),
}

impl Reason {
    /// Converts the reason into the error the await operation raises:
    /// typed errors pass through unchanged, raw values become
    /// `UnexpectedRejection` naming the runtime type.
    #[must_use]
    pub fn into_error(self) -> Error {
        match self {
            Self::Error(e) => e,
            Self::Value(v) => Error::unexpected_rejection(v.type_name()),
        }
    }
}

/// A terminal settlement: fulfilment value or rejection reason.
pub type Settlement = core::result::Result<Value, Reason>;

enum State {
    Pending,
    Fulfilled(Value),
    Rejected(Reason),
}

impl State {
    const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    fn settlement(&self) -> Option<Settlement> {
        match self {
            Self::Pending => None,
            Self::Fulfilled(v) => Some(Ok(v.clone())),
            Self::Rejected(r) => Some(Err(r.clone())),
        }
    }
}

type SettleFn = Box<dyn FnOnce(Settlement) + Send>;
type CancelFn = Box<dyn FnMut(Deferred) + Send>;

struct Inner {
    state: State,
    callbacks: Vec<SettleFn>,
    canceller: Option<CancelFn>,
    /// True while the canceller hook is running. A request arriving during
    /// that window must not mistake the empty slot for a hookless promise.
    cancelling: bool,
}

/// A handle to an eventual value.
#[derive(Clone)]
pub struct Promise {
    inner: Arc<Mutex<Inner>>,
}

/// The settlement side of a promise.
#[derive(Clone)]
pub struct Deferred {
    inner: Arc<Mutex<Inner>>,
}

fn new_inner(canceller: Option<CancelFn>) -> Arc<Mutex<Inner>> {
    Arc::new(Mutex::new(Inner {
        state: State::Pending,
        callbacks: Vec::new(),
        canceller,
        cancelling: false,
    }))
}

fn settle(inner: &Arc<Mutex<Inner>>, settlement: Settlement) {
    let callbacks = {
        let mut guard = inner.lock();
        if !guard.state.is_pending() {
            return;
        }
        guard.state = match settlement.clone() {
            Ok(v) => State::Fulfilled(v),
            Err(r) => State::Rejected(r),
        };
        // Settled promises keep no callbacks and no canceller alive.
        guard.canceller = None;
        std::mem::take(&mut guard.callbacks)
    };
    for cb in callbacks {
        cb(settlement.clone());
    }
}

impl Promise {
    /// Creates an already-fulfilled promise.
    #[must_use]
    pub fn fulfilled(value: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Fulfilled(value),
                callbacks: Vec::new(),
                canceller: None,
                cancelling: false,
            })),
        }
    }

    /// Creates an already-rejected promise with a typed error.
    #[must_use]
    pub fn rejected(error: Error) -> Self {
        Self::rejected_reason(Reason::Error(error))
    }

    /// Creates an already-rejected promise with a raw non-error value.
    #[must_use]
    pub fn rejected_with(value: Value) -> Self {
        Self::rejected_reason(Reason::Value(value))
    }

    fn rejected_reason(reason: Reason) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Rejected(reason),
                callbacks: Vec::new(),
                canceller: None,
                cancelling: false,
            })),
        }
    }

    /// Returns true once the promise has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.inner.lock().state.is_pending()
    }

    /// Returns the settlement if the promise has settled.
    ///
    /// This is the await operation's fast path: it inspects state without
    /// registering or dispatching any callback.
    #[must_use]
    pub fn settlement(&self) -> Option<Settlement> {
        self.inner.lock().state.settlement()
    }

    /// Registers a callback to run when the promise settles.
    ///
    /// Callbacks fire in registration order. Registering on an
    /// already-settled promise fires the callback synchronously.
    pub fn on_settle(&self, cb: impl FnOnce(Settlement) + Send + 'static) {
        let already_settled = {
            let mut guard = self.inner.lock();
            match guard.state.settlement() {
                None => {
                    guard.callbacks.push(Box::new(cb));
                    None
                }
                Some(settlement) => Some((cb, settlement)),
            }
        };
        if let Some((cb, settlement)) = already_settled {
            // Lock released above; the callback runs user code.
            cb(settlement);
        }
    }

    /// Registers a fulfilment and a rejection callback in one step.
    pub fn then(
        &self,
        on_fulfil: impl FnOnce(Value) + Send + 'static,
        on_reject: impl FnOnce(Reason) + Send + 'static,
    ) {
        self.on_settle(move |settlement| match settlement {
            Ok(v) => on_fulfil(v),
            Err(r) => on_reject(r),
        });
    }

    /// Requests cancellation.
    ///
    /// Idempotent: a settled promise ignores the request. A pending promise
    /// runs its canceller hook if it has one (the hook receives the
    /// settlement side and may reject with a custom error); without a hook
    /// the promise rejects with a user cancellation reason. A request
    /// arriving re-entrantly while the hook is already running is a no-op:
    /// the hook owns the in-flight request and the promise must stay
    /// pending until the underlying operation actually exits.
    pub fn cancel(&self) {
        let canceller = {
            let mut guard = self.inner.lock();
            if !guard.state.is_pending() || guard.cancelling {
                return;
            }
            match guard.canceller.take() {
                Some(hook) => {
                    guard.cancelling = true;
                    Some(hook)
                }
                None => None,
            }
        };
        match canceller {
            Some(mut hook) => {
                hook(Deferred {
                    inner: Arc::clone(&self.inner),
                });
                // The hook stays armed while the promise is pending so a
                // later request can reach a re-targeted operation.
                let mut guard = self.inner.lock();
                guard.cancelling = false;
                if guard.state.is_pending() && guard.canceller.is_none() {
                    guard.canceller = Some(hook);
                }
            }
            None => settle(
                &self.inner,
                Err(Reason::Error(Error::cancelled(CancelReason::user(
                    "promise cancelled",
                )))),
            ),
        }
    }

    /// Returns true if both handles refer to the same promise.
    #[must_use]
    pub fn same_promise(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Downgrades to a weak handle (used for cancel-forwarding back-edges).
    #[must_use]
    pub fn downgrade(&self) -> WeakPromise {
        WeakPromise {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner.lock().state {
            State::Pending => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Rejected(_) => "rejected",
        };
        write!(f, "Promise({state})")
    }
}

/// A weak handle to a promise.
pub struct WeakPromise {
    inner: Weak<Mutex<Inner>>,
}

impl WeakPromise {
    /// Upgrades back to a strong handle if the promise is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Promise> {
        self.inner.upgrade().map(|inner| Promise { inner })
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl Deferred {
    /// Creates a new pending deferred.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: new_inner(None),
        }
    }

    /// Creates a pending deferred whose promise runs `canceller` on
    /// cancellation. The hook receives the settlement side; it stays armed
    /// across invocations while the promise is pending.
    #[must_use]
    pub fn with_canceller(canceller: impl FnMut(Deferred) + Send + 'static) -> Self {
        Self {
            inner: new_inner(Some(Box::new(canceller))),
        }
    }

    /// Returns the read side.
    #[must_use]
    pub fn promise(&self) -> Promise {
        Promise {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Fulfils the promise. No-op if already settled.
    pub fn resolve(&self, value: Value) {
        settle(&self.inner, Ok(value));
    }

    /// Rejects the promise with a typed error. No-op if already settled.
    pub fn reject(&self, error: Error) {
        settle(&self.inner, Err(Reason::Error(error)));
    }

    /// Rejects the promise with a raw non-error value. No-op if already settled.
    pub fn reject_with(&self, value: Value) {
        settle(&self.inner, Err(Reason::Value(value)));
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deferred({:?})", self.promise())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn settles_at_most_once() {
        let deferred = Deferred::new();
        deferred.resolve(Value::Int(1));
        deferred.resolve(Value::Int(2));
        deferred.reject(Error::user("late"));
        match deferred.promise().settlement() {
            Some(Ok(Value::Int(1))) => {}
            other => panic!("unexpected settlement: {other:?}"),
        }
    }

    #[test]
    fn callbacks_fire_in_registration_order() {
        let deferred = Deferred::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            deferred.promise().on_settle(move |_| order.lock().push(i));
        }
        deferred.resolve(Value::Null);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn registration_on_settled_fires_synchronously() {
        let promise = Promise::fulfilled(Value::Int(42));
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        promise.on_settle(move |s| {
            assert!(matches!(s, Ok(Value::Int(42))));
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_register_reentrantly() {
        let deferred = Deferred::new();
        let promise = deferred.promise();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let p = promise.clone();
        promise.on_settle(move |_| {
            let c2 = Arc::clone(&c);
            // Registering on the now-settled promise fires immediately.
            p.on_settle(move |_| {
                c2.fetch_add(1, Ordering::SeqCst);
            });
            c.fetch_add(1, Ordering::SeqCst);
        });
        deferred.resolve(Value::Null);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancel_without_hook_rejects_pending() {
        let deferred = Deferred::new();
        let promise = deferred.promise();
        promise.cancel();
        match promise.settlement() {
            Some(Err(Reason::Error(e))) => {
                assert!(e.is_cancelled());
            }
            other => panic!("unexpected settlement: {other:?}"),
        }
    }

    #[test]
    fn cancel_is_noop_once_settled() {
        let deferred = Deferred::new();
        deferred.resolve(Value::Int(9));
        let promise = deferred.promise();
        promise.cancel();
        assert!(matches!(promise.settlement(), Some(Ok(Value::Int(9)))));
    }

    #[test]
    fn canceller_may_reject_with_custom_error() {
        let deferred = Deferred::with_canceller(|d| {
            d.reject(Error::user("operation cancelled").with_code(42));
        });
        let promise = deferred.promise();
        promise.cancel();
        match promise.settlement() {
            Some(Err(Reason::Error(e))) => {
                assert_eq!(e.kind(), ErrorKind::User);
                assert_eq!(e.code(), 42);
            }
            other => panic!("unexpected settlement: {other:?}"),
        }
    }

    #[test]
    fn canceller_runs_exactly_once_per_request() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let deferred = Deferred::with_canceller(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let promise = deferred.promise();
        promise.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Still pending (hook settled nothing), so another request reaches
        // the hook again; a settled promise would ignore it.
        promise.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        deferred.resolve(Value::Null);
        promise.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reentrant_cancel_during_hook_leaves_promise_pending() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let deferred = Deferred::with_canceller(move |d| {
            c.fetch_add(1, Ordering::SeqCst);
            // A nested request while the hook runs must not take the
            // no-hook reject path.
            d.promise().cancel();
        });
        let promise = deferred.promise();
        promise.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!promise.is_settled());
        deferred.resolve(Value::Int(5));
        assert!(matches!(promise.settlement(), Some(Ok(Value::Int(5)))));
    }

    #[test]
    fn settled_promise_drops_callbacks_and_canceller() {
        let witness = Arc::new(());
        let w = Arc::clone(&witness);
        let deferred = Deferred::with_canceller(move |_| {
            let _ = &w;
        });
        let p = deferred.promise();
        let w2 = Arc::clone(&witness);
        p.on_settle(move |_| {
            let _ = &w2;
        });
        assert_eq!(Arc::strong_count(&witness), 3);
        deferred.resolve(Value::Null);
        assert_eq!(Arc::strong_count(&witness), 1);
    }

    #[test]
    fn raw_value_reason_converts_to_unexpected_rejection() {
        let promise = Promise::rejected_with(Value::Null);
        match promise.settlement() {
            Some(Err(reason)) => {
                let err = reason.into_error();
                assert_eq!(err.kind(), ErrorKind::UnexpectedRejection);
                assert_eq!(
                    err.message(),
                    Some("promise rejected with unexpected value of type NULL")
                );
            }
            other => panic!("unexpected settlement: {other:?}"),
        }
    }
}
