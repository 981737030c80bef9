//! Provider adapter layer.
//!
//! Each backend (hosted API, local model, managed endpoint, function
//! invocation) implements [`Provider`] and normalizes its wire-level failures
//! into the shared [`ProviderError`](crate::ProviderError) taxonomy, so the
//! router's retry and fallback logic never inspects provider specifics.
//! Adapters are selected at configuration time via [`create_adapter`] and
//! dispatched through `Arc<dyn Provider>`.

pub mod endpoint;
pub mod openai;
mod scripted;

use crate::config::{AdapterKind, ProviderSettings};
use crate::error::ProviderError;
use crate::types::TokenUsage;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use endpoint::EndpointProvider;
pub use openai::OpenAiProvider;
pub use scripted::ScriptedProvider;

/// Raw result of one provider call, before the router attaches routing
/// metadata (provider id, latency, cached flag).
#[derive(Debug, Clone, PartialEq)]
pub struct RawCompletion {
    pub content: String,
    pub usage: TokenUsage,
}

/// Uniform capability implemented by every backend adapter.
///
/// Implementations must be cancellation-safe: the router drops the returned
/// future when the request deadline expires, which must abort the underlying
/// network call.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> std::result::Result<RawCompletion, ProviderError>;

    /// Identifier of the concrete model served by this adapter.
    fn model_id(&self) -> &str;
}

/// Build an adapter for the configured wire style.
pub fn create_adapter(settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
    Ok(match settings.kind {
        AdapterKind::OpenAiCompatible => Arc::new(OpenAiProvider::from_settings(settings)?),
        AdapterKind::JsonEndpoint => Arc::new(EndpointProvider::from_settings(settings)?),
    })
}

/// Shared HTTP error normalization for reqwest-based adapters.
pub(crate) fn normalize_http_failure(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else if err.is_connect() {
        ProviderError::Unavailable(err.to_string())
    } else if err.is_decode() || err.is_body() {
        ProviderError::Malformed(err.to_string())
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

/// Map an HTTP status line into the shared taxonomy.
pub(crate) fn normalize_status(
    status: reqwest::StatusCode,
    retry_after_ms: Option<u64>,
    body: String,
) -> ProviderError {
    match status.as_u16() {
        408 => ProviderError::Timeout(body),
        429 => ProviderError::RateLimited {
            message: body,
            retry_after_ms,
        },
        401 | 403 => ProviderError::AuthFailure(body),
        400 | 404 | 413 | 422 => ProviderError::Malformed(body),
        _ => ProviderError::Unavailable(format!("HTTP {}: {}", status.as_u16(), body)),
    }
}

/// Best-effort parsing of a `Retry-After: <seconds>` header.
pub(crate) fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let secs: u64 = raw.trim().parse().ok()?;
    Some(secs.saturating_mul(1000))
}
