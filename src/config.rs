//! Static configuration surface.
//!
//! All knobs are consumed at construction time and never renegotiated
//! mid-run. The whole tree is serde-deserializable so deployments can load it
//! from a YAML file, and every section defaults to sensible values when
//! omitted.

use crate::types::ProviderId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Retry and backoff parameters, applied per provider within a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt, per provider.
    pub max_retries: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Apply ±50% multiplicative jitter to computed delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay_ms: 200,
            max_delay_ms: 10_000,
            jitter: true,
        }
    }
}

/// Circuit breaker parameters, tracked independently per provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

impl BreakerPolicy {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Response cache limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub capacity: usize,
    pub ttl_secs: u64,
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 1000,
            ttl_secs: 3600,
            enabled: true,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Context assembly limits. Character budgets, not tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Passages requested from the retriever when the caller gives no k.
    pub default_k: usize,
    pub max_context_chars: usize,
    /// Smallest truncated fragment worth including at the budget boundary.
    pub min_fragment_chars: usize,
    /// Passages scoring below this are dropped before assembly.
    pub similarity_threshold: f32,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_context_chars: 4000,
            min_fragment_chars: 100,
            similarity_threshold: 0.7,
        }
    }
}

/// Wire style an adapter speaks. Selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// OpenAI-style chat completions API.
    OpenAiCompatible,
    /// Plain JSON-POST inference endpoint (`{prompt, max_tokens} -> {text}`),
    /// as spoken by managed endpoints and function-invocation backends.
    JsonEndpoint,
}

/// Per-provider endpoint and credential settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub kind: AdapterKind,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl ProviderSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Top-level configuration for a [`Relay`](crate::Relay).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Fallback preference order. Providers absent from this list are still
    /// usable via an explicit hint but never selected automatically.
    pub preference: Vec<ProviderId>,
    pub retry: RetryPolicy,
    pub breaker: BreakerPolicy,
    pub cache: CacheSettings,
    pub context: ContextSettings,
    /// Default per-request deadline.
    pub deadline_ms: u64,
    pub providers: HashMap<ProviderId, ProviderSettings>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            preference: Vec::new(),
            retry: RetryPolicy::default(),
            breaker: BreakerPolicy::default(),
            cache: CacheSettings::default(),
            context: ContextSettings::default(),
            deadline_ms: 30_000,
            providers: HashMap::new(),
        }
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn with_preference(mut self, preference: Vec<ProviderId>) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerPolicy) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = deadline.as_millis() as u64;
        self
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| Error::configuration(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::configuration(format!("read config: {e}")))?;
        Self::from_yaml_str(&raw)
    }

    /// Sanity checks that catch misconfiguration before anything runs.
    pub fn validate(&self) -> Result<()> {
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(Error::configuration("cache.capacity must be > 0"));
        }
        if self.retry.min_delay_ms > self.retry.max_delay_ms {
            return Err(Error::configuration(
                "retry.min_delay_ms exceeds retry.max_delay_ms",
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(Error::configuration("breaker.failure_threshold must be > 0"));
        }
        if self.deadline_ms == 0 {
            return Err(Error::configuration("deadline_ms must be > 0"));
        }
        Ok(())
    }
}
