//! Error types for the sandkit client.

use std::time::Duration;

use thiserror::Error;

use crate::models::SandboxStatus;

/// Result type for sandkit operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Classification of a sandbox failure reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The sandbox was killed for exceeding its memory allocation.
    OomKilled,
    /// The sandbox exceeded its maximum runtime.
    Timeout,
    /// The container image could not be pulled.
    ImagePullFailed,
    /// The sandbox is no longer present on the runtime node.
    NotFound,
    /// Any other or unreported failure.
    Other,
}

impl FailureKind {
    /// Parse the service's `error_type` string. Unknown strings map to `Other`.
    pub fn from_error_type(error_type: Option<&str>) -> Self {
        match error_type {
            Some("OOM_KILLED") => Self::OomKilled,
            Some("TIMEOUT") => Self::Timeout,
            Some("IMAGE_PULL_FAILED") => Self::ImagePullFailed,
            Some("SANDBOX_NOT_FOUND") => Self::NotFound,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OomKilled => "OOM_KILLED",
            Self::Timeout => "TIMEOUT",
            Self::ImagePullFailed => "IMAGE_PULL_FAILED",
            Self::NotFound => "SANDBOX_NOT_FOUND",
            Self::Other => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Errors that can occur during sandbox operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// No API credential could be resolved.
    #[error("No API key configured: {reason}")]
    Auth {
        /// Why resolution failed.
        reason: String,
    },

    /// A client-side precondition failed before any request was sent.
    #[error("Invalid {field}: {reason}")]
    Validation {
        /// The offending field.
        field: &'static str,
        /// Reason for rejection.
        reason: String,
    },

    /// The service rejected the credential (HTTP 401/403).
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Server-provided message.
        message: String,
    },

    /// The account is out of funds (HTTP 402).
    #[error("Payment required: {message}")]
    PaymentRequired {
        /// Server-provided message.
        message: String,
    },

    /// The requested resource does not exist (HTTP 404).
    #[error("Not found: {message}")]
    NotFound {
        /// Server-provided message.
        message: String,
    },

    /// The client is being rate limited (HTTP 429).
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Server-provided message.
        message: String,
        /// Parsed `Retry-After` hint, when the server sent one.
        retry_after: Option<Duration>,
    },

    /// Any other non-2xx response.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// A bounded wait or request deadline elapsed: a lifecycle poll ran out
    /// of time, a request hit its client-side deadline, or the server
    /// reported HTTP 408 for a command.
    ///
    /// The remote operation is not cancelled when this fires; a later `get`
    /// may observe it completing. `last_status` is only populated by
    /// lifecycle waits.
    #[error("Timed out after {waited:?} (last observed status: {last_status:?})")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
        /// Last status observed before the deadline, if any was seen.
        last_status: Option<SandboxStatus>,
    },

    /// A polled sandbox reached a failed state before the wait completed.
    #[error("Sandbox {id} failed ({kind}) in status {status}: {message}")]
    ResourceFailed {
        /// Sandbox identifier.
        id: String,
        /// Status at the time of failure.
        status: SandboxStatus,
        /// Service-reported failure classification.
        kind: FailureKind,
        /// Human-readable detail.
        message: String,
    },

    /// An archive path-safety violation or partial transfer.
    #[error("Transfer failed for '{path}': {reason}")]
    Transfer {
        /// The offending local or remote path.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("Invalid response from server: {reason}")]
    InvalidResponse {
        /// Parse failure detail.
        reason: String,
    },

    /// The HTTP request itself failed after exhausting transport retries.
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Local filesystem failure during a transfer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// HTTP status carried by this error, when it originated server-side.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::PaymentRequired { .. } => Some(402),
            Self::NotFound { .. } => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True if this error came from a server response (as opposed to a local
    /// precondition, timeout, or transport failure).
    pub fn is_server_error(&self) -> bool {
        self.status().is_some()
    }
}
