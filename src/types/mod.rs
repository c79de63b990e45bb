//! Core types for the suspension and coroutine machinery.
//!
//! - [`id`]: Identifier types (`ContextId`, `CoroutineId`)
//! - [`cancel`]: Cancellation reason and kind types
//! - [`value`]: The dynamic value lattice carried by promises
//! - [`Time`]: Virtual time for the deterministic loop driver

pub mod cancel;
pub mod id;
pub mod value;

pub use cancel::{CancelKind, CancelReason};
pub use id::{ContextId, CoroutineId};
pub use value::Value;

use core::fmt;
use std::time::Duration;

/// A point in virtual time, measured in nanoseconds from loop start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// The zero time (loop start).
    pub const ZERO: Self = Self(0);

    /// Creates a time from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000_000)
    }

    /// Returns the time as nanoseconds.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns this time advanced by the given duration, saturating.
    #[must_use]
    pub fn saturating_add(self, d: Duration) -> Self {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}
