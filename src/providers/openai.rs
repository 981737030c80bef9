//! Reference hosted-API adapter speaking the OpenAI chat-completions wire
//! format. Also covers the many OpenAI-compatible gateways (DeepSeek,
//! Moonshot, local llama.cpp servers in compatible mode, etc.).

use super::{normalize_http_failure, normalize_status, retry_after_ms, Provider, RawCompletion};
use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::types::TokenUsage;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiProvider {
    pub fn new(
        base_url: impl Into<String>,
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
            base_url: base_url.into().trim_end_matches('/').to_string(),
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

    fn build_body(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
            "temperature": temperature,
        })
    }

    fn parse_body(&self, body: &Value) -> std::result::Result<RawCompletion, ProviderError> {
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProviderError::Malformed("response missing choices[0].message.content".into())
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
impl Provider for OpenAiProvider {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> std::result::Result<RawCompletion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self
            .client
            .post(&url)
            .json(&self.build_body(prompt, max_tokens, temperature));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(normalize_http_failure)?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after = retry_after_ms(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            debug!(
                http_status = status.as_u16(),
                model = self.model.as_str(),
                "openai-compatible request failed"
            );
            return Err(normalize_status(status, retry_after, body));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        self.parse_body(&body)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
