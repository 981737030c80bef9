//! Core request/response types and provider identifiers.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier for a configured backend provider.
///
/// This is a closed set: providers are selected at configuration time, not
/// discovered at runtime. The variants cover the backend families the system
/// integrates with: hosted APIs (`OpenAi`, `Anthropic`), a locally hosted
/// model (`Llama`), managed cloud inference (`Bedrock`, `SageMaker`) and
/// function-invocation inference (`Lambda`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Llama,
    Bedrock,
    SageMaker,
    Lambda,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Llama => "llama",
            ProviderId::Bedrock => "bedrock",
            ProviderId::SageMaker => "sagemaker",
            ProviderId::Lambda => "lambda",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAi),
            "anthropic" => Ok(ProviderId::Anthropic),
            "llama" => Ok(ProviderId::Llama),
            "bedrock" => Ok(ProviderId::Bedrock),
            "sagemaker" => Ok(ProviderId::SageMaker),
            "lambda" => Ok(ProviderId::Lambda),
            other => Err(Error::configuration(format!(
                "unknown provider '{other}'"
            ))),
        }
    }
}

/// Token accounting for one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A text-generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Preferred provider; tried first unless its circuit is open.
    #[serde(default)]
    pub provider_hint: Option<ProviderId>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Pre-assembled context passages, prepended by the caller if desired.
    #[serde(default)]
    pub context: Option<Vec<String>>,
}

impl GenerationRequest {
    /// Create a request with the default sampling parameters
    /// (`max_tokens = 1000`, `temperature = 0.7`).
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            provider_hint: None,
            max_tokens: 1000,
            temperature: 0.7,
            context: None,
        }
    }

    pub fn with_provider_hint(mut self, provider: ProviderId) -> Self {
        self.provider_hint = Some(provider);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = Some(context);
        self
    }

    /// Validate the request invariants before any provider is contacted.
    pub fn validate(&self) -> Result<()> {
        if self.normalized_prompt().is_empty() {
            return Err(Error::invalid_request("prompt must not be empty"));
        }
        if self.max_tokens == 0 {
            return Err(Error::invalid_request("max_tokens must be greater than 0"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::invalid_request(format!(
                "temperature {} outside [0, 2]",
                self.temperature
            )));
        }
        Ok(())
    }

    /// Prompt with internal whitespace collapsed and edges trimmed.
    ///
    /// Cache fingerprints are computed over this form so that two logically
    /// identical requests collide regardless of incidental whitespace.
    pub fn normalized_prompt(&self) -> String {
        self.prompt.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Full prompt text handed to an adapter: context passages (in order),
    /// a blank line, then the prompt itself.
    pub fn effective_prompt(&self) -> String {
        match &self.context {
            Some(passages) if !passages.is_empty() => {
                let mut out = passages.join("\n\n");
                out.push_str("\n\n");
                out.push_str(&self.prompt);
                out
            }
            _ => self.prompt.clone(),
        }
    }
}

/// A normalized generation response. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    pub provider: ProviderId,
    pub model_id: String,
    pub tokens_used: u64,
    pub latency_ms: u64,
    /// True when served from the response cache without a provider call.
    pub cached: bool,
    #[serde(default)]
    pub usage: TokenUsage,
}
