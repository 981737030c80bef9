//! Request routing: cache lookup, provider selection, retry/backoff,
//! fallback and circuit breaking.
//!
//! Per-request flow:
//!
//! ```text
//! CACHE_LOOKUP -> (HIT: DONE)
//!              -> (MISS: SELECT_PROVIDER) -> CALLING
//!                 -> (SUCCESS: CACHE_STORE -> DONE)
//!                 -> (FAILURE: RETRY_OR_FALLBACK) -> SELECT_PROVIDER | EXHAUSTED
//! ```
//!
//! Providers within one request run strictly sequentially — never two
//! billable calls in parallel for the same request. Concurrent requests
//! sharing a cache key are collapsed into one provider call (singleflight).

mod health;
mod singleflight;

pub use health::{HealthSnapshot, ProviderHealth};

use crate::cache::{CacheKey, CacheStats, ResponseCache};
use crate::config::{RelayConfig, RetryPolicy};
use crate::error::ProviderAttempt;
use crate::metrics::{MetricsSink, Outcome};
use crate::providers::Provider;
use crate::types::{GenerationRequest, GenerationResponse, ProviderId};
use crate::{Error, Result};
use rand::Rng;
use singleflight::{await_outcome, Flight, Singleflight};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

struct RouterInner {
    providers: HashMap<ProviderId, Arc<dyn Provider>>,
    preference: Vec<ProviderId>,
    retry: RetryPolicy,
    health: HashMap<ProviderId, ProviderHealth>,
    cache: Arc<dyn ResponseCache>,
    metrics: Arc<dyn MetricsSink>,
    inflight: Singleflight,
    deadline: Duration,
}

/// The routing state machine. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    pub fn new(
        config: &RelayConfig,
        providers: HashMap<ProviderId, Arc<dyn Provider>>,
        cache: Arc<dyn ResponseCache>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        // No configured preference: fall back to every registered provider
        // in stable name order.
        let preference = if config.preference.is_empty() {
            let mut ids: Vec<ProviderId> = providers.keys().copied().collect();
            ids.sort_by_key(|id| id.as_str());
            ids
        } else {
            config.preference.clone()
        };

        let health = providers
            .keys()
            .map(|id| (*id, ProviderHealth::new(&config.breaker)))
            .collect();

        Self {
            inner: Arc::new(RouterInner {
                providers,
                preference,
                retry: config.retry.clone(),
                health,
                cache,
                metrics,
                inflight: Singleflight::new(),
                deadline: config.deadline(),
            }),
        }
    }

    /// Route a request using the configured default deadline.
    pub async fn route(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let deadline = self.inner.deadline;
        self.route_with_deadline(request, deadline).await
    }

    /// Route a request, abandoning any in-flight provider call once
    /// `deadline` expires. Singleflight waiters attached to a timed-out
    /// leader receive the same [`Error::DeadlineExceeded`] outcome.
    pub async fn route_with_deadline(
        &self,
        request: GenerationRequest,
        deadline: Duration,
    ) -> Result<GenerationResponse> {
        request.validate()?;
        if self.inner.providers.is_empty() {
            return Err(Error::NoProviders);
        }

        let key = CacheKey::for_request(&request);

        // Cache lookup strictly precedes provider selection. A backend
        // failure is a miss, never fatal.
        match self.inner.cache.get(&key).await {
            Ok(Some(hit)) => {
                debug!(key = %key, provider = hit.provider.as_str(), "cache hit");
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cache lookup failed; treating as miss"),
        }

        match self.inner.inflight.join(key.as_str()) {
            Flight::Waiter(rx) => await_outcome(rx).await,
            Flight::Leader(tx) => {
                // Subscribe before spawning so the published outcome cannot
                // be missed.
                let rx = tx.subscribe();
                let router = self.clone();
                let deadline_ms = deadline.as_millis() as u64;
                let key_owned = key.clone();
                // The chain runs in its own task: it survives leader
                // cancellation and always publishes an outcome to waiters.
                tokio::spawn(async move {
                    let work = router.execute_chain(&request, &key_owned);
                    let outcome = match tokio::time::timeout(deadline, work).await {
                        Ok(res) => res,
                        Err(_) => Err(Error::DeadlineExceeded { deadline_ms }),
                    };
                    router
                        .inner
                        .inflight
                        .complete(key_owned.as_str(), &tx, outcome);
                });
                await_outcome(rx).await
            }
        }
    }

    /// Compute the per-request fallback chain.
    ///
    /// The hinted provider is tried first while its circuit is closed.
    /// Open-circuit providers are moved to the tail rather than excluded, so
    /// a recovered provider heals on the next probe. A hint pointing at an
    /// open circuit does not jump the queue: it keeps precedence only within
    /// the deprioritized tail.
    fn fallback_chain(&self, hint: Option<ProviderId>) -> Vec<ProviderId> {
        let inner = &self.inner;
        let mut ordered: Vec<ProviderId> = Vec::new();
        if let Some(h) = hint {
            if inner.providers.contains_key(&h) {
                ordered.push(h);
            }
        }
        for id in &inner.preference {
            if inner.providers.contains_key(id) && !ordered.contains(id) {
                ordered.push(*id);
            }
        }

        let (closed, open): (Vec<_>, Vec<_>) = ordered
            .into_iter()
            .partition(|id| !inner.health[id].is_open());
        closed.into_iter().chain(open).collect()
    }

    /// Exponential backoff doubling from `min_delay_ms`, capped at
    /// `max_delay_ms`, with ±50% jitter. A server-supplied retry hint
    /// overrides the computed base (still capped).
    fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let retry = &self.inner.retry;
        let base = retry
            .min_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let mut delay_ms = match retry_after {
            Some(ra) => ra.as_millis() as u64,
            None => base,
        }
        .min(retry.max_delay_ms);

        if retry.jitter && delay_ms > 0 {
            let factor: f64 = rand::thread_rng().gen_range(0.5..1.5);
            delay_ms = (delay_ms as f64 * factor) as u64;
        }
        Duration::from_millis(delay_ms)
    }

    /// Walk the fallback chain, retrying transient failures per provider and
    /// advancing immediately on permanent ones.
    async fn execute_chain(
        &self,
        request: &GenerationRequest,
        key: &CacheKey,
    ) -> Result<GenerationResponse> {
        let inner = &*self.inner;
        let request_id = Uuid::new_v4();
        let chain = self.fallback_chain(request.provider_hint);
        if chain.is_empty() {
            return Err(Error::NoProviders);
        }
        debug!(
            request_id = %request_id,
            chain = ?chain.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
            "selected fallback chain"
        );

        let prompt = request.effective_prompt();
        let mut attempts: Vec<ProviderAttempt> = Vec::new();

        for id in chain {
            let provider = inner.providers[&id].clone();
            let health = &inner.health[&id];
            let mut retries = 0u32;

            let final_err = loop {
                let start = Instant::now();
                match provider
                    .generate(&prompt, request.max_tokens, request.temperature)
                    .await
                {
                    Ok(raw) => {
                        let latency_ms = start.elapsed().as_millis() as u64;
                        health.on_success();
                        inner
                            .metrics
                            .record(id, latency_ms, raw.usage.total_tokens, Outcome::Success);
                        info!(
                            request_id = %request_id,
                            provider = id.as_str(),
                            latency_ms,
                            retries,
                            tokens = raw.usage.total_tokens,
                            "generation succeeded"
                        );

                        let response = GenerationResponse {
                            content: raw.content,
                            provider: id,
                            model_id: provider.model_id().to_string(),
                            tokens_used: raw.usage.total_tokens,
                            latency_ms,
                            cached: false,
                            usage: raw.usage,
                        };
                        if let Err(e) = inner.cache.put(key, &response).await {
                            warn!(error = %e, "cache store failed");
                        }
                        return Ok(response);
                    }
                    Err(err) => {
                        let latency_ms = start.elapsed().as_millis() as u64;
                        health.on_failure();
                        if err.is_transient() {
                            inner.metrics.record(id, latency_ms, 0, Outcome::TransientFail);
                            if retries < inner.retry.max_retries {
                                let delay = self.backoff_delay(retries, err.retry_after());
                                debug!(
                                    request_id = %request_id,
                                    provider = id.as_str(),
                                    retries,
                                    delay_ms = delay.as_millis() as u64,
                                    error = %err,
                                    "transient failure; backing off"
                                );
                                if !delay.is_zero() {
                                    tokio::time::sleep(delay).await;
                                }
                                retries += 1;
                                continue;
                            }
                        } else {
                            inner.metrics.record(id, latency_ms, 0, Outcome::PermanentFail);
                        }
                        break err;
                    }
                }
            };

            warn!(
                request_id = %request_id,
                provider = id.as_str(),
                retries,
                error = %final_err,
                "provider failed; advancing fallback chain"
            );
            attempts.push(ProviderAttempt {
                provider: id,
                retries,
                error: final_err,
            });
        }

        Err(Error::AllProvidersExhausted { attempts })
    }

    /// Per-provider circuit state, for operational introspection.
    pub fn health_snapshot(&self) -> HashMap<ProviderId, HealthSnapshot> {
        self.inner
            .health
            .iter()
            .map(|(id, h)| (*id, h.snapshot()))
            .collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.inner.preference.clone()
    }
}
