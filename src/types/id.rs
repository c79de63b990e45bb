//! Identifier types for suspension contexts and coroutines.
//!
//! Identities come from process-wide atomic counters: contexts and coroutines
//! are created ad hoc (no arena or registry owns them), so a monotonically
//! increasing counter is all the identity they need.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static CONTEXT_COUNTER: AtomicU64 = AtomicU64::new(1);
static COROUTINE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for a suspension context.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates the next context identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a context ID for testing purposes.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(n: u64) -> Self {
        Self(n)
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({})", self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// A unique identifier for a coroutine.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoroutineId(u64);

impl CoroutineId {
    /// Allocates the next coroutine identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(COROUTINE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a coroutine ID for testing purposes.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(n: u64) -> Self {
        Self(n)
    }
}

impl fmt::Debug for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoroutineId({})", self.0)
    }
}

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K{}", self.0)
    }
}
