//! Error taxonomy shared by the retry policy and the traffic controller.
//!
//! Operations protected by the core report failures through any error type
//! that implements [`Classify`]. Classification decides whether a failure is
//! worth another attempt; it never changes the error the caller sees.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Category of a failure, independent of its concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ErrorKind {
    /// Connection refused, reset or unreachable peer.
    Network,
    /// The peer did not answer in time.
    Timeout,
    /// 5xx-class failure reported by the peer.
    Server,
    /// Explicit throttling, e.g. an HTTP 429.
    RateLimited,
    /// Admission refused by a circuit breaker.
    CircuitOpen,
    /// Credentials rejected.
    Auth,
    /// Authenticated but not allowed.
    Permission,
    /// The request or local configuration is invalid.
    Config,
    /// Quota, credit or disk exhausted.
    ResourceExhausted,
    /// Anything not classified above.
    Unknown,
}

impl ErrorKind {
    /// Stable lowercase label, used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Server => "server",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Auth => "auth",
            ErrorKind::Permission => "permission",
            ErrorKind::Config => "config",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Kinds retried by a default retry policy.
    pub fn default_retryable() -> &'static [ErrorKind] {
        &[
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::Server,
            ErrorKind::RateLimited,
        ]
    }

    /// Kinds that are never retried by a default retry policy.
    pub fn default_non_retryable() -> &'static [ErrorKind] {
        &[
            ErrorKind::Auth,
            ErrorKind::Permission,
            ErrorKind::Config,
            ErrorKind::ResourceExhausted,
            ErrorKind::CircuitOpen,
        ]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an error onto an [`ErrorKind`].
///
/// # Example
///
/// ```
/// use qbt_resilience_core::{Classify, ErrorKind};
/// use std::time::Duration;
///
/// #[derive(Debug)]
/// enum ApiError {
///     Throttled { retry_after: Duration },
///     BadCredentials,
/// }
///
/// impl Classify for ApiError {
///     fn kind(&self) -> ErrorKind {
///         match self {
///             ApiError::Throttled { .. } => ErrorKind::RateLimited,
///             ApiError::BadCredentials => ErrorKind::Auth,
///         }
///     }
///
///     fn retry_after(&self) -> Option<Duration> {
///         match self {
///             ApiError::Throttled { retry_after } => Some(*retry_after),
///             _ => None,
///         }
///     }
/// }
///
/// assert_eq!(ApiError::BadCredentials.kind(), ErrorKind::Auth);
/// ```
pub trait Classify {
    /// Category of this error.
    fn kind(&self) -> ErrorKind;

    /// Delay requested by the peer before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl<T: Classify + ?Sized> Classify for &T {
    fn kind(&self) -> ErrorKind {
        (**self).kind()
    }

    fn retry_after(&self) -> Option<Duration> {
        (**self).retry_after()
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn kind(&self) -> ErrorKind {
        (**self).kind()
    }

    fn retry_after(&self) -> Option<Duration> {
        (**self).retry_after()
    }
}

impl<T: Classify + ?Sized> Classify for Arc<T> {
    fn kind(&self) -> ErrorKind {
        (**self).kind()
    }

    fn retry_after(&self) -> Option<Duration> {
        (**self).retry_after()
    }
}

impl Classify for std::io::Error {
    fn kind(&self) -> ErrorKind {
        use std::io::ErrorKind as Io;
        match std::io::Error::kind(self) {
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::AddrNotAvailable
            | Io::BrokenPipe
            | Io::UnexpectedEof => ErrorKind::Network,
            Io::TimedOut | Io::WouldBlock => ErrorKind::Timeout,
            Io::PermissionDenied => ErrorKind::Permission,
            Io::InvalidInput => ErrorKind::Config,
            Io::OutOfMemory => ErrorKind::ResourceExhausted,
            _ => ErrorKind::Unknown,
        }
    }
}

/// A ready-made classified error for clients without their own error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct Failure {
    kind: ErrorKind,
    message: String,
    retry_after: Option<Duration>,
}

impl Failure {
    /// Creates a failure of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attaches a peer-provided delay hint.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Human readable description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Classify for Failure {
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}
