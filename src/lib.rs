//! Yieldpoint: sequential-looking code on top of a single-threaded,
//! callback-driven event loop.
//!
//! # Overview
//!
//! A caller can request the eventual value of a promise and have its logical
//! thread of execution park exactly there, resuming only once the promise
//! settles, while the loop keeps servicing other pending work. Concurrency
//! is strictly cooperative: control transfers only at explicit parking
//! points, never preemptively, and exactly one logical thread runs at any
//! instant.
//!
//! # Core Operations
//!
//! - [`wait`]: park the calling logical thread until a promise settles;
//!   already-settled promises return synchronously without touching the loop
//! - [`spawn`]: run a routine in its own suspension context, immediately
//!   returning a promise for its eventual outcome
//! - [`coroutine`]: drive an explicit step sequence from settlement
//!   callbacks, for routines written without stackful suspension
//!
//! # Module Structure
//!
//! - [`types`]: Core types (identifiers, virtual time, cancellation
//!   reasons, the dynamic value lattice)
//! - [`error`]: Error types
//! - [`promise`]: The promise collaborator (settlement, ordered callbacks,
//!   idempotent cancellation)
//! - [`fiber`]: Suspension engine (`start`/`suspend`/`resume` over parkable
//!   contexts)
//! - [`wait`]: The await operation
//! - [`spawn`]: The async wrapper
//! - [`coroutine`]: The coroutine scheduler
//! - [`driver`]: The consumed event-loop capability
//! - [`timer`]: Deadline-ordered callback heap
//! - [`lab`]: Deterministic loop driver with virtual time, for tests and
//!   loop-less embedders
//!
//! # Cancellation
//!
//! Cancellation is promise-driven and catchable: cancelling the promise
//! returned by [`spawn`] or [`coroutine`] forwards the request to whichever
//! promise the routine is currently parked on; the routine observes an
//! ordinary cancellation error there and may recover, re-targeting any
//! later request. There are no engine-level timeouts; race the awaited
//! promise against a timer-backed one instead.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod coroutine;
pub mod driver;
pub mod error;
pub mod fiber;
pub mod lab;
pub mod promise;
pub mod spawn;
pub mod timer;
pub mod tracing_compat;
pub mod types;
pub mod wait;

pub use coroutine::{coroutine, Resume, Step};
pub use driver::Driver;
pub use error::{Error, ErrorCategory, ErrorKind, Result};
pub use lab::LabDriver;
pub use promise::{Deferred, Promise, Reason, Settlement};
pub use spawn::spawn;
pub use types::{CancelKind, CancelReason, ContextId, CoroutineId, Time, Value};
pub use wait::wait;
