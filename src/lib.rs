//! # llm-relay
//!
//! A provider-routing LLM client with response caching, retry/fallback and
//! retrieval-augmented context assembly.
//!
//! ## Overview
//!
//! This library routes text-generation requests across a set of heterogeneous
//! backend providers behind one uniform interface. A request is validated,
//! checked against a shared response cache, and then driven through a fallback
//! chain of providers with per-provider retry, exponential backoff and circuit
//! breaking. Concurrent identical requests are collapsed into a single
//! provider call. Optionally, a retrieval capability can enrich the prompt
//! with semantically relevant passages before routing.
//!
//! ## Key Features
//!
//! - **Unified Facade**: [`Relay`] provides a single entry point for
//!   generation with or without retrieved context
//! - **Provider Routing**: [`router::Router`] orchestrates selection, retries,
//!   fallback and circuit breaking across providers
//! - **Caching**: bounded LRU response cache with lazy TTL expiry via the
//!   [`cache`] module
//! - **Singleflight**: concurrent callers sharing a cache key share one
//!   in-flight provider call
//! - **Context Assembly**: [`context::ContextAssembler`] merges retrieved
//!   passages into the prompt under a character budget
//! - **Metrics**: per-attempt outcome reporting via [`metrics::MetricsSink`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_relay::{Relay, GenerationRequest, ProviderId};
//! use llm_relay::providers::ScriptedProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> llm_relay::Result<()> {
//!     let relay = Relay::builder()
//!         .register_provider(ProviderId::OpenAi, Arc::new(ScriptedProvider::ok("hello")))
//!         .build()?;
//!
//!     let response = relay
//!         .generate_response(GenerationRequest::new("capital of France?"))
//!         .await?;
//!     println!("{} (cached: {})", response.content, response.cached);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Core request/response types and provider identifiers |
//! | [`config`] | Static configuration surface consumed at construction |
//! | [`cache`] | Response cache with pluggable backends |
//! | [`providers`] | Provider adapter trait and concrete adapters |
//! | [`router`] | Routing state machine: fallback, retry, circuit breaking |
//! | [`context`] | Retrieval-augmented context assembly |
//! | [`metrics`] | Fire-and-forget per-attempt metrics sinks |

pub mod cache;
pub mod config;
pub mod context;
pub mod metrics;
pub mod providers;
pub mod relay;
pub mod router;
pub mod types;

/// Error type for the library
pub mod error;
pub use error::{Error, ProviderAttempt, ProviderError};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

// Re-export main types for convenience
pub use config::RelayConfig;
pub use relay::{Relay, RelayBuilder};
pub use router::Router;
pub use types::{GenerationRequest, GenerationResponse, ProviderId, TokenUsage};
