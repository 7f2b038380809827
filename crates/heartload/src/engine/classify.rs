//! Classification of connection-ending errors.
//!
//! Errors are unwrapped through their `source()` chain down to the innermost
//! cause; only that root decides whether the failure was a timeout.

use std::error::Error;
use std::io;

/// Outcome of classifying a failed read/write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Timeout,
    Unknown,
}

impl ErrorClass {
    /// Label used for the `status` dimension of disconnect metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            ErrorClass::Timeout => "timeout",
            ErrorClass::Unknown => "unknown_error",
        }
    }
}

/// Walks the cause chain until no further source is available.
pub fn root_cause<'a>(err: &'a (dyn Error + 'static)) -> &'a (dyn Error + 'static) {
    let mut cause = err;
    while let Some(next) = cause.source() {
        cause = next;
    }
    cause
}

/// Whether this single error (not its chain) reports a timeout condition.
pub fn is_timeout(err: &(dyn Error + 'static)) -> bool {
    if err.is::<tokio::time::error::Elapsed>() {
        return true;
    }
    match err.downcast_ref::<io::Error>() {
        Some(e) if e.kind() == io::ErrorKind::TimedOut => true,
        // io::Error hides a boxed payload from source(), so look at it directly.
        Some(e) => e
            .get_ref()
            .is_some_and(|inner| inner.is::<tokio::time::error::Elapsed>()),
        None => false,
    }
}

pub fn classify(err: &(dyn Error + 'static)) -> ErrorClass {
    if is_timeout(root_cause(err)) {
        ErrorClass::Timeout
    } else {
        ErrorClass::Unknown
    }
}
