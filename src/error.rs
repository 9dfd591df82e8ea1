//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

// == Fetch Error Enum ==
/// Failure of a read-through fetch.
///
/// `E` is the error type of the caller's fetch function. Every caller that
/// shared one in-flight fetch receives the same `Arc<E>`.
#[derive(Error)]
pub enum FetchError<E> {
    /// The fetch function returned an error; never cached
    #[error("upstream fetch failed: {0}")]
    Upstream(Arc<E>),

    /// The per-call timeout elapsed before the fetch resolved
    #[error("timed out waiting for fetch")]
    Timeout,

    /// The fetch task panicked or was torn down before producing a result
    #[error("fetch task ended without a result")]
    Aborted,
}

impl<E> FetchError<E> {
    /// The upstream error, if this is one.
    pub fn upstream(&self) -> Option<&E> {
        match self {
            FetchError::Upstream(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout)
    }
}

impl<E> Clone for FetchError<E> {
    fn clone(&self) -> Self {
        match self {
            FetchError::Upstream(err) => FetchError::Upstream(Arc::clone(err)),
            FetchError::Timeout => FetchError::Timeout,
            FetchError::Aborted => FetchError::Aborted,
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for FetchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Upstream(err) => f.debug_tuple("Upstream").field(err).finish(),
            FetchError::Timeout => f.write_str("Timeout"),
            FetchError::Aborted => f.write_str("Aborted"),
        }
    }
}

// == Config Error Enum ==
/// Invalid cache configuration, raised once at setup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("namespace '{namespace}': capacity must be at least 1")]
    InvalidCapacity { namespace: String },

    #[error("namespace '{namespace}': invalid ttl: {reason}")]
    InvalidTtl { namespace: String, reason: String },

    #[error("namespace '{namespace}': sweep interval must be non-zero")]
    InvalidSweepInterval { namespace: String },

    #[error("malformed cache config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {var}")]
    Env { var: String, value: String },
}

// == Result Type Alias ==
/// Convenience Result type for configuration.
pub type Result<T> = std::result::Result<T, ConfigError>;
