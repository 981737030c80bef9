//! Cache key generation.

use crate::types::GenerationRequest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Deterministic fingerprint of a generation request.
///
/// Derived from `(normalized prompt, provider_hint or "auto", max_tokens,
/// temperature)`. The fields are canonicalized through a `BTreeMap` so key
/// ordering can never perturb the hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    hash: String,
}

impl CacheKey {
    pub fn for_request(request: &GenerationRequest) -> Self {
        let mut parts: BTreeMap<&str, String> = BTreeMap::new();
        parts.insert("prompt", request.normalized_prompt());
        parts.insert(
            "provider",
            request
                .provider_hint
                .map(|p| p.as_str().to_string())
                .unwrap_or_else(|| "auto".to_string()),
        );
        parts.insert("max_tokens", request.max_tokens.to_string());
        // Fixed precision keeps 0.7f32 and 0.70f32 identical.
        parts.insert("temperature", format!("{:.2}", request.temperature));

        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Self { hash }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}
