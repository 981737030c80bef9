//! Retrieval-augmented context assembly.
//!
//! The assembler sits between the caller and the router: it asks an external
//! retrieval capability for the passages most relevant to a query,
//! concatenates them under a character budget and renders a single prompt.
//! Context is an enhancement, not a requirement — retrieval failures and
//! empty results pass the original query through untouched.

use crate::config::ContextSettings;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// One ranked passage returned by the retrieval capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl Passage {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
            metadata: None,
        }
    }
}

/// External semantic search capability: `search(query, k)` returns up to `k`
/// passages ranked by relevance. The algorithm behind it is out of scope.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>>;
}

const DEFAULT_INSTRUCTION: &str =
    "Answer the question using the context below when it is relevant.";

pub struct ContextAssembler {
    retriever: Arc<dyn Retriever>,
    settings: ContextSettings,
    instruction: String,
}

impl ContextAssembler {
    pub fn new(retriever: Arc<dyn Retriever>, settings: ContextSettings) -> Self {
        Self {
            retriever,
            settings,
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Build the prompt for `query`, enriched with up to `k` retrieved
    /// passages (configured default when `None`). Never fails: any retrieval
    /// problem degrades to the plain query.
    pub async fn assemble(&self, query: &str, k: Option<usize>) -> String {
        let k = k.unwrap_or(self.settings.default_k);
        let passages = match self.retriever.search(query, k).await {
            Ok(passages) => passages,
            Err(e) => {
                warn!(error = %e, "retrieval failed; passing query through");
                return query.to_string();
            }
        };

        let context = self.build_context(passages);
        if context.is_empty() {
            return query.to_string();
        }

        debug!(context_chars = context.len(), "assembled retrieval context");
        format!("{}\n\n{}\n\n{}", self.instruction, context, query)
    }

    /// Concatenate passages in relevance order under the character budget.
    /// The lowest-ranked passages are the ones dropped or truncated; a
    /// truncated fragment is only kept when at least `min_fragment_chars` of
    /// budget remain.
    fn build_context(&self, mut passages: Vec<Passage>) -> String {
        passages.retain(|p| p.score >= self.settings.similarity_threshold);
        passages.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let budget = self.settings.max_context_chars;
        let mut parts: Vec<String> = Vec::new();
        let mut used = 0usize;

        for passage in passages {
            let len = passage.text.chars().count();
            if used + len > budget {
                let remaining = budget - used;
                if remaining >= self.settings.min_fragment_chars {
                    parts.push(passage.text.chars().take(remaining).collect());
                }
                break;
            }
            used += len;
            parts.push(passage.text);
        }

        parts.join("\n\n")
    }
}
