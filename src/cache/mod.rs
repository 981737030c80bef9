//! # Response Caching Module
//!
//! Bounded response caching with pluggable backends, reducing duplicate
//! provider calls for logically identical requests.
//!
//! ## Overview
//!
//! Caching is valuable for:
//! - Reducing API costs by avoiding duplicate requests
//! - Improving response latency for repeated queries
//! - Absorbing bursts of identical traffic together with the router's
//!   singleflight de-duplication
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheKey`] | Deterministic request fingerprint |
//! | [`ResponseCache`] | Trait for cache backends |
//! | [`MemoryCache`] | In-memory LRU cache with lazy TTL expiry |
//! | [`NullCache`] | No-op backend for disabling caching |
//! | [`CacheStats`] | Hit/miss/expiry counters |
//!
//! ## Cache Key Generation
//!
//! Fingerprints are derived from the normalized prompt text, the provider
//! hint (or `"auto"`), `max_tokens` and `temperature`. Identical requests
//! collide; any parameter difference produces a distinct key.
//!
//! The cache itself never calls out to providers, and a backend failure is
//! downgraded to a miss by the router — caching is never fatal.

mod backend;
mod key;

pub use backend::{CacheStats, MemoryCache, NullCache, ResponseCache};
pub use key::CacheKey;
