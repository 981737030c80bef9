//! Scripted in-process provider for tests and examples.

use super::{Provider, RawCompletion};
use crate::error::ProviderError;
use crate::types::TokenUsage;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

enum Fallthrough {
    Succeed(String),
    Fail(ProviderError),
}

/// A provider that replays a fixed script of outcomes, then falls through to
/// a steady-state behavior. Counts calls so tests can assert exactly how many
/// provider calls the router issued.
pub struct ScriptedProvider {
    model: String,
    script: Mutex<VecDeque<Result<RawCompletion, ProviderError>>>,
    fallthrough: Fallthrough,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// Always succeeds with `content`.
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            model: "scripted".into(),
            script: Mutex::new(VecDeque::new()),
            fallthrough: Fallthrough::Succeed(content.into()),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            model: "scripted".into(),
            script: Mutex::new(VecDeque::new()),
            fallthrough: Fallthrough::Fail(error),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fails `times` with clones of `error`, then succeeds with `content`.
    pub fn flaky(error: ProviderError, times: u32, content: impl Into<String>) -> Self {
        let mut script = VecDeque::new();
        for _ in 0..times {
            script.push_back(Err(error.clone()));
        }
        Self {
            model: "scripted".into(),
            script: Mutex::new(script),
            fallthrough: Fallthrough::Succeed(content.into()),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Total `generate` calls observed.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The prompt passed to the most recent `generate` call.
    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().expect("prompt lock").last().cloned()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn generate(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<RawCompletion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompt lock")
            .push(prompt.to_string());
        if let Some(next) = self.script.lock().expect("script lock").pop_front() {
            return next;
        }
        match &self.fallthrough {
            Fallthrough::Succeed(content) => Ok(RawCompletion {
                content: content.clone(),
                usage: TokenUsage::new(prompt.split_whitespace().count() as u64, 1),
            }),
            Fallthrough::Fail(error) => Err(error.clone()),
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
