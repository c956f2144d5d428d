//! Domain errors for the Trellis request orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by an [`EntityApi`](crate::domain::ports::EntityApi) implementation.
///
/// Backends are responsible for tagging rate limiting explicitly so the
/// orchestrator can dispatch on the variant instead of probing status fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend is throttling this client (HTTP 429 or equivalent).
    #[error("Rate limited by backend{}", retry_after_suffix(.retry_after_secs))]
    RateLimited {
        /// Suggested wait before retrying, in seconds, when the backend sent one.
        retry_after_secs: Option<u64>,
    },

    /// Any other failure: transport, validation, or a non-429 backend status.
    #[error("Backend request failed{}: {message}", status_suffix(.status))]
    Other {
        /// HTTP-like status code, absent for transport and decode failures.
        status: Option<u16>,
        /// Human readable failure description.
        message: String,
    },
}

fn retry_after_suffix(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(" (retry after {secs}s)"))
        .unwrap_or_default()
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl BackendError {
    /// Build a non-rate-limit failure.
    pub fn other(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Other {
            status,
            message: message.into(),
        }
    }

    /// Returns true if this error signals backend throttling.
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Stable classification codes surfaced to callers of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryErrorCode {
    /// Retry budget exhausted while the backend kept throttling.
    RateLimit,
    /// Any other failure.
    FetchError,
}

impl QueryErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "RATE_LIMIT",
            Self::FetchError => "FETCH_ERROR",
        }
    }
}

impl std::fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned from [`QueryOrchestrator::query`](crate::services::QueryOrchestrator::query).
///
/// `Clone` because every caller coalesced onto one backend call receives the
/// same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The backend kept rate limiting until the attempt cap was reached.
    #[error("{message}")]
    RateLimit {
        /// Human readable summary.
        message: String,
        /// How long the caller should wait before issuing the query again.
        retry_in_ms: u64,
    },

    /// A non-rate-limit failure. Never retried.
    #[error("{message}")]
    Fetch {
        /// Human readable summary.
        message: String,
        /// The backend error that caused this failure.
        #[source]
        cause: BackendError,
    },
}

impl QueryError {
    /// Build the terminal rate-limit failure.
    pub fn rate_limited(attempts: u32, retry_in_ms: u64) -> Self {
        Self::RateLimit {
            message: format!(
                "Backend is rate limiting requests; gave up after {attempts} attempts"
            ),
            retry_in_ms,
        }
    }

    /// Wrap a non-retryable backend failure.
    pub fn fetch(cause: BackendError) -> Self {
        Self::Fetch {
            message: format!("Failed to fetch entities: {cause}"),
            cause,
        }
    }

    pub const fn code(&self) -> QueryErrorCode {
        match self {
            Self::RateLimit { .. } => QueryErrorCode::RateLimit,
            Self::Fetch { .. } => QueryErrorCode::FetchError,
        }
    }

    /// Suggested wait before re-issuing the query, only for rate-limit failures.
    pub const fn retry_in_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_in_ms, .. } => Some(*retry_in_ms),
            Self::Fetch { .. } => None,
        }
    }
}
