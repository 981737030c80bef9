//! End-to-end routing behavior: retry, fallback, circuit breaking, deadlines.

use async_trait::async_trait;
use llm_relay::config::{BreakerPolicy, RetryPolicy};
use llm_relay::metrics::{InMemoryMetrics, Outcome};
use llm_relay::providers::{Provider, RawCompletion, ScriptedProvider};
use llm_relay::types::TokenUsage;
use llm_relay::{
    Error, GenerationRequest, ProviderError, ProviderId, Relay, RelayConfig,
};
use std::sync::Arc;
use std::time::Duration;

/// Retry policy with no delays, so tests run fast and deterministically.
fn instant_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        min_delay_ms: 0,
        max_delay_ms: 0,
        jitter: false,
    }
}

struct SlowProvider {
    delay: Duration,
}

#[async_trait]
impl Provider for SlowProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<RawCompletion, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(RawCompletion {
            content: "slow".into(),
            usage: TokenUsage::new(1, 1),
        })
    }

    fn model_id(&self) -> &str {
        "slow"
    }
}

#[tokio::test]
async fn transient_failures_are_retried_then_succeed() {
    let provider = Arc::new(ScriptedProvider::flaky(
        ProviderError::Timeout("slow upstream".into()),
        2,
        "Paris",
    ));
    let metrics = Arc::new(InMemoryMetrics::new());
    let relay = Relay::builder()
        .with_config(RelayConfig::default().with_retry(instant_retry(3)))
        .register_provider(ProviderId::OpenAi, provider.clone())
        .with_metrics(metrics.clone())
        .build()
        .unwrap();

    let response = relay
        .generate_response(GenerationRequest::new("capital of France?"))
        .await
        .unwrap();

    assert_eq!(response.content, "Paris");
    assert_eq!(response.provider, ProviderId::OpenAi);
    assert_eq!(provider.calls(), 3);
    // every attempt leaves a metrics record
    assert_eq!(metrics.count(ProviderId::OpenAi, Outcome::TransientFail), 2);
    assert_eq!(metrics.count(ProviderId::OpenAi, Outcome::Success), 1);
}

#[tokio::test]
async fn permanent_failure_gets_exactly_one_attempt() {
    let broken = Arc::new(ScriptedProvider::failing(ProviderError::AuthFailure(
        "bad key".into(),
    )));
    let backup = Arc::new(ScriptedProvider::ok("from backup"));
    let metrics = Arc::new(InMemoryMetrics::new());
    let relay = Relay::builder()
        .with_config(
            RelayConfig::default()
                .with_preference(vec![ProviderId::OpenAi, ProviderId::Llama])
                .with_retry(instant_retry(3)),
        )
        .register_provider(ProviderId::OpenAi, broken.clone())
        .register_provider(ProviderId::Llama, backup.clone())
        .with_metrics(metrics.clone())
        .build()
        .unwrap();

    let response = relay
        .generate_response(GenerationRequest::new("q"))
        .await
        .unwrap();

    assert_eq!(response.content, "from backup");
    assert_eq!(response.provider, ProviderId::Llama);
    assert_eq!(broken.calls(), 1);
    assert_eq!(metrics.count(ProviderId::OpenAi, Outcome::PermanentFail), 1);
    assert_eq!(metrics.count(ProviderId::Llama, Outcome::Success), 1);
}

#[tokio::test]
async fn exhaustion_reports_every_provider_attempted() {
    let relay = Relay::builder()
        .with_config(
            RelayConfig::default()
                .with_preference(vec![ProviderId::OpenAi, ProviderId::Bedrock])
                .with_retry(instant_retry(2)),
        )
        .register_provider(
            ProviderId::OpenAi,
            Arc::new(ScriptedProvider::failing(ProviderError::Unavailable(
                "down".into(),
            ))),
        )
        .register_provider(
            ProviderId::Bedrock,
            Arc::new(ScriptedProvider::failing(ProviderError::AuthFailure(
                "expired".into(),
            ))),
        )
        .build()
        .unwrap();

    let err = relay
        .generate_response(GenerationRequest::new("q"))
        .await
        .unwrap_err();

    let Error::AllProvidersExhausted { attempts } = err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].provider, ProviderId::OpenAi);
    assert_eq!(attempts[0].retries, 2); // transient: retried to the limit
    assert_eq!(attempts[1].provider, ProviderId::Bedrock);
    assert_eq!(attempts[1].retries, 0); // permanent: single attempt
}

#[tokio::test]
async fn hint_is_tried_before_the_preference_order() {
    let first = Arc::new(ScriptedProvider::ok("first"));
    let hinted = Arc::new(ScriptedProvider::ok("hinted"));
    let relay = Relay::builder()
        .with_config(
            RelayConfig::default().with_preference(vec![ProviderId::OpenAi, ProviderId::Llama]),
        )
        .register_provider(ProviderId::OpenAi, first.clone())
        .register_provider(ProviderId::Llama, hinted)
        .build()
        .unwrap();

    let response = relay
        .generate_response(GenerationRequest::new("q").with_provider_hint(ProviderId::Llama))
        .await
        .unwrap();

    assert_eq!(response.provider, ProviderId::Llama);
    assert_eq!(first.calls(), 0);
}

#[tokio::test]
async fn open_circuit_deprioritizes_failing_provider() {
    let flapping = Arc::new(ScriptedProvider::failing(ProviderError::Unavailable(
        "down".into(),
    )));
    let steady = Arc::new(ScriptedProvider::ok("steady"));
    let relay = Relay::builder()
        .with_config(
            RelayConfig::default()
                .with_preference(vec![ProviderId::OpenAi, ProviderId::Llama])
                .with_retry(instant_retry(0))
                .with_breaker(BreakerPolicy {
                    failure_threshold: 2,
                    cooldown_secs: 60,
                }),
        )
        .register_provider(ProviderId::OpenAi, flapping.clone())
        .register_provider(ProviderId::Llama, steady.clone())
        .build()
        .unwrap();

    // Two requests fail over from the flapping provider and trip its breaker.
    for i in 0..2 {
        let r = relay
            .generate_response(GenerationRequest::new(format!("q{i}")))
            .await
            .unwrap();
        assert_eq!(r.provider, ProviderId::Llama);
    }
    assert_eq!(flapping.calls(), 2);

    // Circuit now open: the steady provider is tried first, so the flapping
    // one sees no further traffic.
    let r = relay
        .generate_response(GenerationRequest::new("q2"))
        .await
        .unwrap();
    assert_eq!(r.provider, ProviderId::Llama);
    assert_eq!(flapping.calls(), 2);

    let health = relay.health_snapshot();
    assert!(health[&ProviderId::OpenAi].open_remaining_ms.is_some());
    assert!(health[&ProviderId::Llama].open_remaining_ms.is_none());
}

#[tokio::test]
async fn open_circuit_provider_still_probed_when_alone() {
    // A single provider with an open circuit stays reachable: deprioritized,
    // never excluded.
    let only = Arc::new(ScriptedProvider::flaky(
        ProviderError::Unavailable("down".into()),
        2,
        "recovered",
    ));
    let relay = Relay::builder()
        .with_config(
            RelayConfig::default()
                .with_retry(instant_retry(0))
                .with_breaker(BreakerPolicy {
                    failure_threshold: 2,
                    cooldown_secs: 60,
                }),
        )
        .register_provider(ProviderId::OpenAi, only.clone())
        .build()
        .unwrap();

    for i in 0..2 {
        relay
            .generate_response(GenerationRequest::new(format!("q{i}")))
            .await
            .unwrap_err();
    }
    assert!(relay.health_snapshot()[&ProviderId::OpenAi]
        .open_remaining_ms
        .is_some());

    let response = relay
        .generate_response(GenerationRequest::new("probe"))
        .await
        .unwrap();
    assert_eq!(response.content, "recovered");

    // The probe's success closed the circuit again.
    let snap = &relay.health_snapshot()[&ProviderId::OpenAi];
    assert!(snap.open_remaining_ms.is_none());
    assert_eq!(snap.consecutive_failures, 0);
}

#[tokio::test]
async fn deadline_cuts_off_slow_providers() {
    let relay = Relay::builder()
        .register_provider(
            ProviderId::OpenAi,
            Arc::new(SlowProvider {
                delay: Duration::from_secs(5),
            }),
        )
        .build()
        .unwrap();

    let err = relay
        .generate_with_deadline(GenerationRequest::new("q"), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded { .. }));
}

#[tokio::test]
async fn coalesced_callers_share_the_deadline_outcome() {
    // Concurrent identical requests attach to one in-flight call; when its
    // deadline expires, every caller receives the same outcome.
    let relay = Relay::builder()
        .register_provider(
            ProviderId::OpenAi,
            Arc::new(SlowProvider {
                delay: Duration::from_secs(5),
            }),
        )
        .build()
        .unwrap();

    let callers = (0..3).map(|_| {
        let relay = relay.clone();
        async move {
            relay
                .generate_with_deadline(
                    GenerationRequest::new("shared question"),
                    Duration::from_millis(50),
                )
                .await
        }
    });

    for result in futures::future::join_all(callers).await {
        assert!(matches!(result, Err(Error::DeadlineExceeded { .. })));
    }
}

#[tokio::test]
async fn invalid_requests_never_reach_a_provider() {
    let provider = Arc::new(ScriptedProvider::ok("x"));
    let relay = Relay::builder()
        .register_provider(ProviderId::OpenAi, provider.clone())
        .build()
        .unwrap();

    for bad in [
        GenerationRequest::new("   "),
        GenerationRequest::new("q").with_max_tokens(0),
        GenerationRequest::new("q").with_temperature(3.0),
    ] {
        assert!(matches!(
            relay.generate_response(bad).await,
            Err(Error::InvalidRequest(_))
        ));
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn rate_limit_is_transient_and_retried() {
    let provider = Arc::new(ScriptedProvider::flaky(
        ProviderError::RateLimited {
            message: "slow down".into(),
            retry_after_ms: Some(0),
        },
        1,
        "eventually",
    ));
    let relay = Relay::builder()
        .with_config(RelayConfig::default().with_retry(instant_retry(1)))
        .register_provider(ProviderId::OpenAi, provider.clone())
        .build()
        .unwrap();

    let response = relay
        .generate_response(GenerationRequest::new("q"))
        .await
        .unwrap();
    assert_eq!(response.content, "eventually");
    assert_eq!(provider.calls(), 2);
}
