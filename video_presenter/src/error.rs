//! Error types for the video presenter
//!
//! One error enum covers the whole presentation core: argument validation,
//! lifecycle misuse, back-buffer pressure and failures reported by the
//! graphics backend.

use std::fmt;

/// Result type for presenter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Presenter errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Null, zero or otherwise unusable input
    InvalidArgument(String),

    /// Operation requires a setup step that did not happen
    NotInitialized(String),

    /// Setup step repeated
    AlreadyInitialized(String),

    /// Frame and presenter pixel formats disagree
    FormatMismatch(String),

    /// Back-buffer pool is empty and the caller asked not to block
    InputFull(String),

    /// Queried resource is absent
    NotFound(String),

    /// Backend-specific error (wraps the native API result code)
    BackendError(String),

    /// Binding, slot or buffer bounds exceeded
    OutOfRange(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Internal bookkeeping is inconsistent
    InvariantViolation(String),
}

impl Error {
    /// Prefix the message with the name of the step that failed.
    ///
    /// The variant is preserved so callers can still match on the error kind.
    pub fn in_step(self, step: &str) -> Self {
        let wrap = |msg: String| format!("{}: {}", step, msg);
        match self {
            Error::InvalidArgument(msg) => Error::InvalidArgument(wrap(msg)),
            Error::NotInitialized(msg) => Error::NotInitialized(wrap(msg)),
            Error::AlreadyInitialized(msg) => Error::AlreadyInitialized(wrap(msg)),
            Error::FormatMismatch(msg) => Error::FormatMismatch(wrap(msg)),
            Error::InputFull(msg) => Error::InputFull(wrap(msg)),
            Error::NotFound(msg) => Error::NotFound(wrap(msg)),
            Error::BackendError(msg) => Error::BackendError(wrap(msg)),
            Error::OutOfRange(msg) => Error::OutOfRange(wrap(msg)),
            Error::OutOfMemory => Error::OutOfMemory,
            Error::InvariantViolation(msg) => Error::InvariantViolation(wrap(msg)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::NotInitialized(msg) => write!(f, "Not initialized: {}", msg),
            Error::AlreadyInitialized(msg) => write!(f, "Already initialized: {}", msg),
            Error::FormatMismatch(msg) => write!(f, "Format mismatch: {}", msg),
            Error::InputFull(msg) => write!(f, "Input full: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfRange(msg) => write!(f, "Out of range: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
