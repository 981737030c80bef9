use crate::types::ProviderId;
use std::time::Duration;
use thiserror::Error;

/// Normalized provider failure taxonomy.
///
/// Every adapter maps its wire-level failures into one of these variants so
/// the router's retry and fallback logic stays provider-agnostic.
/// `Timeout`, `RateLimited` and `Unavailable` are transient (retryable);
/// `AuthFailure` and `Malformed` are permanent and advance the fallback chain
/// without retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// Server-supplied retry hint, if any (`Retry-After`).
        retry_after_ms: Option<u64>,
    },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("malformed request or response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the router should retry this failure against the same provider.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::Unavailable(_)
        )
    }

    /// Server-requested backoff, when present. Overrides computed backoff.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

/// Diagnostic record for one provider's final failure within a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: ProviderId,
    /// Number of retries performed after the first attempt.
    pub retries: u32,
    pub error: ProviderError,
}

/// Unified error type for llm-relay.
///
/// Cloneable by design: singleflight waiters share a single outcome, so every
/// variant carries owned, cheap-to-clone data instead of error sources.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Local validation failure; the request was never sent to a provider.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Every provider in the fallback chain failed after its retry budget.
    #[error("all providers exhausted ({} tried)", .attempts.len())]
    AllProvidersExhausted { attempts: Vec<ProviderAttempt> },

    /// The per-request deadline expired before any provider produced a result.
    #[error("deadline of {deadline_ms}ms exceeded")]
    DeadlineExceeded { deadline_ms: u64 },

    /// Cache backend failure. The router downgrades this to a cache miss; it
    /// only surfaces from direct cache operations.
    #[error("cache backend '{backend}' failed: {message}")]
    Cache { backend: String, message: String },

    #[error("no providers registered")]
    NoProviders,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Error::InvalidRequest(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub(crate) fn cache(backend: &str, msg: impl Into<String>) -> Self {
        Error::Cache {
            backend: backend.to_string(),
            message: msg.into(),
        }
    }
}
