//! Error types and error handling strategy for yieldpoint.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - User-raised errors cross the await/coroutine boundary unchanged, never wrapped
//! - Panics inside a suspension context are isolated and converted to `Panicked`
//! - Nothing is logged-and-swallowed: every failure surfaces as a returned
//!   `Err` or as the rejection reason of a produced promise
//!
//! # Error Categories
//!
//! - **User**: raised by user routines, propagated as-is
//! - **Rejection**: a promise rejected with a raw non-error value
//! - **Contract**: misuse of the suspension or coroutine protocol
//! - **Cancellation**: cancellation surfaced to a routine (ordinary and catchable)
//! - **Internal**: runtime bugs and stalled loops

use core::fmt;
use std::sync::Arc;

use crate::types::CancelReason;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Error raised by user code inside a routine or a promise canceller.
    User,
    /// A promise was rejected with a raw value that is not an error.
    UnexpectedRejection,
    /// `resume` was invoked on a context not currently suspended, or
    /// `suspend` was invoked outside any context.
    InvalidState,
    /// A coroutine step yielded a value that is not promise-typed.
    InvalidYield,
    /// The operation was cancelled.
    Cancelled,
    /// A context body panicked.
    Panicked,
    /// Internal error (bug or stalled event loop).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::User => ErrorCategory::User,
            Self::UnexpectedRejection => ErrorCategory::Rejection,
            Self::InvalidState | Self::InvalidYield => ErrorCategory::Contract,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::Panicked | Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the kind's display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::UnexpectedRejection => "UnexpectedRejection",
            Self::InvalidState => "InvalidState",
            Self::InvalidYield => "InvalidYield",
            Self::Cancelled => "Cancelled",
            Self::Panicked => "Panicked",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// User-originated errors.
    User,
    /// Non-error rejection payloads.
    Rejection,
    /// Protocol misuse (suspend/resume/yield contract violations).
    Contract,
    /// Cancellation-related failures.
    Cancellation,
    /// Internal runtime errors.
    Internal,
}

/// The core error type.
///
/// Carries a kind, an optional human-readable message, a numeric code
/// (user errors may carry one; `UnexpectedRejection` always carries zero),
/// an optional cancellation reason, and an optional source error.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    code: i64,
    cancel_reason: Option<CancelReason>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind and no message.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            code: 0,
            cancel_reason: None,
            source: None,
        }
    }

    /// Creates a user error with a message.
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_message(message)
    }

    /// Creates an `UnexpectedRejection` error naming the runtime type of the
    /// rejection value. Code is zero and there is no source.
    #[must_use]
    pub fn unexpected_rejection(type_name: &str) -> Self {
        Self::new(ErrorKind::UnexpectedRejection).with_message(format!(
            "promise rejected with unexpected value of type {type_name}"
        ))
    }

    /// Creates an `InvalidState` error with a message.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState).with_message(message)
    }

    /// Creates an `InvalidYield` error naming the runtime type of the
    /// yielded value.
    #[must_use]
    pub fn invalid_yield(type_name: &str) -> Self {
        Self::new(ErrorKind::InvalidYield).with_message(format!(
            "expected coroutine to yield a promise, but got {type_name}"
        ))
    }

    /// Creates a cancellation error with the given reason.
    #[must_use]
    pub fn cancelled(reason: CancelReason) -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            message: None,
            code: 0,
            cancel_reason: Some(reason),
            source: None,
        }
    }

    /// Creates a `Panicked` error from a captured panic message.
    #[must_use]
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Panicked).with_message(message)
    }

    /// Creates a `Panicked` error from a payload caught by
    /// `std::panic::catch_unwind`.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "context body panicked".to_string()
        };
        Self::panicked(message)
    }

    /// Creates an internal error with a message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(message)
    }

    /// Attaches a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches a numeric code.
    #[must_use]
    pub const fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    /// Attaches an underlying source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        self.code
    }

    /// Returns the cancellation reason, if this is a cancellation error.
    #[must_use]
    pub const fn cancel_reason(&self) -> Option<&CancelReason> {
        self.cancel_reason.as_ref()
    }

    /// Returns true if this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this error came from a panicking context body.
    #[must_use]
    pub const fn is_panicked(&self) -> bool {
        matches!(self.kind, ErrorKind::Panicked)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, &self.cancel_reason) {
            (Some(msg), _) => write!(f, "{}: {msg}", self.kind),
            (None, Some(reason)) => write!(f, "{}: {reason}", self.kind),
            (None, None) => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// A specialized Result type for yieldpoint operations.
pub type Result<T> = core::result::Result<T, Error>;
