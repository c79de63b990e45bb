//! The coroutine scheduler: a trampoline that drives an explicit step
//! sequence from promise-settlement callbacks.
//!
//! This is the non-stackful realization of "pause until the promise
//! settles": no suspension context exists, so the routine is written as a
//! resumable step function instead of arbitrary blocking code. Each call
//! receives what the previous yield produced ([`Resume`]) and answers with
//! what to do next ([`Step`]).
//!
//! State machine: `RunningStep -> AwaitingPromise -> {RunningStep |
//! Fulfilled | Rejected | Cancelled}`.

use crate::error::Error;
use crate::promise::{Deferred, Promise, WeakPromise};
use crate::tracing_compat::trace;
use crate::types::{CoroutineId, Value};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// What the trampoline injects into the next step.
#[derive(Debug)]
pub enum Resume {
    /// First step; nothing has been yielded yet.
    Start,
    /// The previously yielded promise fulfilled with this value.
    Value(Value),
    /// The previously yielded promise rejected; the step function may treat
    /// this as caught (yield or return again) or rethrow it.
    Throw(Error),
}

/// What a step produces.
#[derive(Debug)]
pub enum Step {
    /// Await this value; must be promise-typed or the coroutine rejects
    /// with `InvalidYield`.
    Yield(Value),
    /// Terminate the sequence, fulfilling the result promise.
    Return(Value),
    /// Terminate the sequence, rejecting the result promise.
    Throw(Error),
}

type StepFn = Box<dyn FnMut(Resume) -> Step + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoroStatus {
    RunningStep,
    AwaitingPromise,
    Fulfilled,
    Rejected,
    Cancelled,
}

impl CoroStatus {
    const fn is_terminal(self) -> bool {
        matches!(self, Self::Fulfilled | Self::Rejected | Self::Cancelled)
    }
}

struct CoroState {
    id: CoroutineId,
    status: CoroStatus,
    step: Option<StepFn>,
    /// Weak: the strong reference to the awaited promise lives with whoever
    /// will settle it; its callback list holds this state strongly, and a
    /// strong edge back would be a cycle.
    current: Option<WeakPromise>,
    /// Last promise a cancel request was forwarded to; guards "exactly once
    /// per currently-pending target".
    last_cancel_target: Option<WeakPromise>,
    result: Deferred,
}

/// Runs `step_fn` as a coroutine and returns a promise for its result.
///
/// The first step runs synchronously, so a sequence that returns without
/// yielding settles the promise before this function returns, with no loop
/// work required. Yielded promises drive subsequent steps: fulfilment is
/// injected as [`Resume::Value`], rejection as [`Resume::Throw`] (a raw
/// non-error rejection payload is converted to `UnexpectedRejection` first).
/// Yielding a non-promise value rejects the result with `InvalidYield`
/// naming the value's runtime type.
///
/// Cancelling the returned promise cancels the promise the coroutine is
/// parked on, exactly once per target; if the step function treats the
/// resulting error as caught and yields again, the new promise becomes the
/// target of any further cancel request.
pub fn coroutine<F>(step_fn: F) -> Promise
where
    F: FnMut(Resume) -> Step + Send + 'static,
{
    let id = CoroutineId::next();
    let state = Arc::new_cyclic(|weak: &Weak<Mutex<CoroState>>| {
        let weak = weak.clone();
        Mutex::new(CoroState {
            id,
            status: CoroStatus::RunningStep,
            step: Some(Box::new(step_fn)),
            current: None,
            last_cancel_target: None,
            result: Deferred::with_canceller(move |_| forward_cancel(&weak)),
        })
    });
    let promise = state.lock().result.promise();
    advance(&state, Resume::Start);
    promise
}

fn forward_cancel(weak: &Weak<Mutex<CoroState>>) {
    let Some(state) = weak.upgrade() else {
        return;
    };
    let target = {
        let mut st = state.lock();
        if st.status != CoroStatus::AwaitingPromise {
            None
        } else {
            match st.current.as_ref().and_then(WeakPromise::upgrade) {
                Some(promise) => {
                    let already = st
                        .last_cancel_target
                        .as_ref()
                        .and_then(WeakPromise::upgrade)
                        .is_some_and(|prev| prev.same_promise(&promise));
                    if already {
                        None
                    } else {
                        st.last_cancel_target = Some(promise.downgrade());
                        Some(promise)
                    }
                }
                None => None,
            }
        }
    };
    if let Some(promise) = target {
        trace!(coroutine = %state.lock().id, "forwarding cancellation to awaited promise");
        promise.cancel();
    }
}

fn advance(state: &Arc<Mutex<CoroState>>, input: Resume) {
    let mut input = input;
    loop {
        // The routine is taken out of the record so no lock is held while
        // user code runs; a step may settle promises or cancel reentrantly.
        let mut step_fn = {
            let mut st = state.lock();
            if st.status.is_terminal() {
                return;
            }
            st.status = CoroStatus::RunningStep;
            st.current = None;
            match st.step.take() {
                Some(f) => f,
                None => return,
            }
        };
        let produced = catch_unwind(AssertUnwindSafe(|| step_fn(input)));
        state.lock().step = Some(step_fn);
        match produced {
            Err(panic) => return finish(state, Err(Error::from_panic(panic.as_ref()))),
            Ok(Step::Return(value)) => return finish(state, Ok(value)),
            Ok(Step::Throw(error)) => return finish(state, Err(error)),
            Ok(Step::Yield(Value::Promise(promise))) => {
                // A settled yield loops straight into the next step; only a
                // genuinely pending promise registers a callback, so a long
                // run of settled yields never grows the stack.
                if let Some(settlement) = promise.settlement() {
                    input = match settlement {
                        Ok(value) => Resume::Value(value),
                        Err(reason) => Resume::Throw(reason.into_error()),
                    };
                    continue;
                }
                {
                    let mut st = state.lock();
                    st.status = CoroStatus::AwaitingPromise;
                    st.current = Some(promise.downgrade());
                }
                trace!(coroutine = %state.lock().id, "coroutine awaiting yielded promise");
                let trampoline = Arc::clone(state);
                promise.on_settle(move |settlement| {
                    let input = match settlement {
                        Ok(value) => Resume::Value(value),
                        Err(reason) => Resume::Throw(reason.into_error()),
                    };
                    advance(&trampoline, input);
                });
                return;
            }
            Ok(Step::Yield(other)) => {
                return finish(state, Err(Error::invalid_yield(other.type_name())));
            }
        }
    }
}

fn finish(state: &Arc<Mutex<CoroState>>, outcome: Result<Value, Error>) {
    let result = {
        let mut st = state.lock();
        st.status = match &outcome {
            Ok(_) => CoroStatus::Fulfilled,
            Err(e) if e.is_cancelled() => CoroStatus::Cancelled,
            Err(_) => CoroStatus::Rejected,
        };
        st.step = None;
        st.current = None;
        st.last_cancel_target = None;
        trace!(coroutine = %st.id, status = ?st.status, "coroutine finished");
        st.result.clone()
    };
    match outcome {
        Ok(value) => result.resolve(value),
        Err(error) => result.reject(error),
    }
}
