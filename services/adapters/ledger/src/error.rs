//! Failure classification for ledger calls
//!
//! Every failure is put in exactly one of two buckets. Retryable failures
//! move the router on to the next endpoint; fatal failures mean the remote
//! logic rejected the call and stop the router immediately.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Connection,
    RateLimited,
    /// Malformed or unexpected response from the node itself.
    InvalidResponse,
    Revert,
    CallException,
    /// The call succeeded but its return data does not match the ABI.
    Decode,
    /// The endpoint cannot perform this operation (e.g. no sender account).
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retryable,
    Fatal,
}

impl ErrorKind {
    pub fn disposition(self) -> Disposition {
        match self {
            ErrorKind::Timeout
            | ErrorKind::Connection
            | ErrorKind::RateLimited
            | ErrorKind::InvalidResponse => Disposition::Retryable,
            ErrorKind::Revert
            | ErrorKind::CallException
            | ErrorKind::Decode
            | ErrorKind::Unsupported => Disposition::Fatal,
        }
    }

    /// Whether a state-changing request that failed this way may still have
    /// reached the ledger. Only an explicit rate-limit answer proves it did not.
    pub fn may_have_applied(self) -> bool {
        !matches!(self, ErrorKind::RateLimited) && self.disposition() == Disposition::Retryable
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::InvalidResponse => "invalid response",
            ErrorKind::Revert => "revert",
            ErrorKind::CallException => "call exception",
            ErrorKind::Decode => "decode",
            ErrorKind::Unsupported => "unsupported",
        };
        f.write_str(label)
    }
}

/// A single failed call against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error from {endpoint}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub endpoint: String,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn timeout(endpoint: impl Into<String>, after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            endpoint,
            format!("no response within {}ms", after.as_millis()),
        )
    }

    pub fn disposition(&self) -> Disposition {
        self.kind.disposition()
    }

    pub fn is_retryable(&self) -> bool {
        self.disposition() == Disposition::Retryable
    }

    pub fn is_fatal(&self) -> bool {
        self.disposition() == Disposition::Fatal
    }
}

/// Outcome of a routed operation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Remote logic rejected the call; no further endpoints were tried.
    #[error("{operation} rejected: {source}")]
    Fatal {
        operation: String,
        #[source]
        source: ClassifiedError,
    },

    #[error("{operation} failed on all {attempted} attempted endpoints, last error: {last}")]
    Exhausted {
        operation: String,
        attempted: usize,
        last: ClassifiedError,
    },

    /// A state-changing request failed in a way that does not rule out it
    /// being applied; it was not replayed on another endpoint.
    #[error("{operation} outcome unknown: {source}")]
    Unconfirmed {
        operation: String,
        #[source]
        source: ClassifiedError,
    },

    #[error("no ledger endpoints configured")]
    NoEndpoints,

    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

impl RouterError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RouterError::Fatal { .. })
    }

    /// The error that ended the operation, if any endpoint was reached.
    pub fn last_error(&self) -> Option<&ClassifiedError> {
        match self {
            RouterError::Fatal { source, .. } | RouterError::Unconfirmed { source, .. } => {
                Some(source)
            }
            RouterError::Exhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    pub fn endpoints_exhausted(&self) -> usize {
        match self {
            RouterError::Exhausted { attempted, .. } => *attempted,
            _ => 0,
        }
    }
}

const REVERT_MARKERS: &[&str] = &["revert", "execution reverted"];
const CALL_EXCEPTION_MARKERS: &[&str] = &["invalid opcode", "call exception"];
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "too many requests", "429"];

/// Classify a JSON-RPC error response (or a bare transport message when
/// `code` is `None`).
pub fn classify_rpc_error(code: Option<i64>, message: &str) -> ErrorKind {
    let lower = message.to_ascii_lowercase();

    if CALL_EXCEPTION_MARKERS.iter().any(|m| lower.contains(m)) {
        return ErrorKind::CallException;
    }
    if code == Some(3) || REVERT_MARKERS.iter().any(|m| lower.contains(m)) {
        return ErrorKind::Revert;
    }
    if matches!(code, Some(-32005) | Some(429)) || RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
    {
        return ErrorKind::RateLimited;
    }
    match code {
        // Node answered with an error unrelated to the call itself; another
        // endpoint may well succeed.
        Some(_) => ErrorKind::InvalidResponse,
        None => ErrorKind::Connection,
    }
}
