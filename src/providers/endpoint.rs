//! Generic JSON-POST inference adapter.
//!
//! Covers the managed-endpoint and function-invocation backends, which share
//! a minimal payload shape: `{prompt, max_tokens, temperature}` in,
//! `{text | output | generation, usage?}` out.

use super::{normalize_http_failure, normalize_status, retry_after_ms, Provider, RawCompletion};
use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::types::TokenUsage;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub struct EndpointProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl EndpointProvider {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
            model: model.into(),
        })
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        Self::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
            settings.model.clone(),
            settings.request_timeout(),
        )
    }

    fn parse_body(body: &Value) -> std::result::Result<RawCompletion, ProviderError> {
        let content = body
            .get("text")
            .or_else(|| body.get("output"))
            .or_else(|| body.get("generation"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProviderError::Malformed("response missing text/output/generation field".into())
            })?;
        let usage = body
            .get("usage")
            .map(|u| {
                TokenUsage::new(
                    u["prompt_tokens"].as_u64().unwrap_or(0),
                    u["completion_tokens"].as_u64().unwrap_or(0),
                )
            })
            .unwrap_or_default();
        Ok(RawCompletion {
            content: content.trim().to_string(),
            usage,
        })
    }
}

#[async_trait]
impl Provider for EndpointProvider {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> std::result::Result<RawCompletion, ProviderError> {
        let payload = serde_json::json!({
            "prompt": prompt,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });
        let mut req = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(normalize_http_failure)?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after = retry_after_ms(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(normalize_status(status, retry_after, body));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Self::parse_body(&body)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_alternate_content_fields() {
        for field in ["text", "output", "generation"] {
            let mut server = mockito::Server::new_async().await;
            let _m = server
                .mock("POST", "/generate")
                .with_status(200)
                .with_body(format!(r#"{{"{field}":" hello "}}"#))
                .create_async()
                .await;

            let p = EndpointProvider::new(
                format!("{}/generate", server.url()),
                None,
                "lambda-llm",
                Duration::from_secs(5),
            )
            .unwrap();
            let raw = p.generate("q", 10, 0.5).await.unwrap();
            assert_eq!(raw.content, "hello");
            assert_eq!(raw.usage, TokenUsage::default());
        }
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/generate")
            .with_status(503)
            .with_body("endpoint cold")
            .create_async()
            .await;

        let p = EndpointProvider::new(
            format!("{}/generate", server.url()),
            None,
            "sm-endpoint",
            Duration::from_secs(5),
        )
        .unwrap();
        let err = p.generate("q", 10, 0.5).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[test]
    fn missing_content_field_is_malformed() {
        let body = serde_json::json!({"usage": {"prompt_tokens": 1}});
        assert!(matches!(
            EndpointProvider::parse_body(&body),
            Err(ProviderError::Malformed(_))
        ));
    }
}
