use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;

/// Error kinds of the engine. Parsing accumulates configuration and semantic
/// errors to give a full report; once the tick loop runs every error is fatal.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed input documents.
    #[error("configuration: {0}")]
    Configuration(String),

    /// File open, allocation limits, database connect.
    #[error("resource: {0}")]
    Resource(String),

    /// Invalid references, inconsistent totals, unresolved set ids.
    #[error("semantic: {0}")]
    Semantic(String),

    /// Arithmetic not-a-number, unknown operator, missing computable.
    #[error("runtime: {0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn resource<S: Into<String>>(msg: S) -> Self {
        Error::Resource(msg.into())
    }

    pub fn semantic<S: Into<String>>(msg: S) -> Self {
        Error::Semantic(msg.into())
    }

    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        Error::Runtime(msg.into())
    }
}

static ERROR_FLAG: AtomicBool = AtomicBool::new(false);
static WARNING_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Mark the process as failed. Set by the logging shims below and checked by
/// the driver between phases; once raised it is never cleared within a run.
pub fn raise_error_flag() {
    ERROR_FLAG.store(true, Ordering::SeqCst);
}

pub fn has_errors() -> bool {
    ERROR_FLAG.load(Ordering::SeqCst)
}

/// Clear the flag and warning counter. Only test harnesses and the very start
/// of a run may do this.
pub fn reset_errors() {
    ERROR_FLAG.store(false, Ordering::SeqCst);
    WARNING_COUNT.store(0, Ordering::SeqCst);
}

pub fn count_warning() {
    WARNING_COUNT.fetch_add(1, Ordering::SeqCst);
}

pub fn warnings() -> usize {
    WARNING_COUNT.load(Ordering::SeqCst)
}

/// Log an error and raise the process error flag in one step.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        $crate::error::raise_error_flag();
    }};
}

/// Log a warning and count it; recoverable, does not raise the flag.
#[macro_export]
macro_rules! recoverable {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
        $crate::error::count_warning();
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_is_sticky() {
        reset_errors();
        assert!(!has_errors());
        raise_error_flag();
        assert!(has_errors());
        count_warning();
        assert_eq!(warnings(), 1);
        reset_errors();
        assert!(!has_errors());
    }
}
