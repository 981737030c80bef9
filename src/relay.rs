//! Top-level facade tying configuration, providers, cache, metrics and
//! retrieval together behind one entry point.

use crate::cache::{CacheStats, MemoryCache, NullCache, ResponseCache};
use crate::config::RelayConfig;
use crate::context::{ContextAssembler, Retriever};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::providers::{create_adapter, Provider};
use crate::router::{HealthSnapshot, Router};
use crate::types::{GenerationRequest, GenerationResponse, ProviderId};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The unified client. Construct one per deployment and clone it freely;
/// clones share the cache, circuit state and in-flight request table.
#[derive(Clone)]
pub struct Relay {
    router: Router,
    assembler: Option<Arc<ContextAssembler>>,
}

impl Relay {
    pub fn builder() -> RelayBuilder {
        RelayBuilder::new()
    }

    /// Build a relay entirely from configuration, constructing one adapter
    /// per configured provider.
    pub fn from_config(config: RelayConfig) -> Result<Self> {
        RelayBuilder::new().with_config(config).build()
    }

    /// Generate a completion for `request` under the configured default
    /// deadline.
    pub async fn generate_response(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse> {
        self.router.route(request).await
    }

    /// Generate a completion with a caller-supplied deadline overriding the
    /// configured default.
    pub async fn generate_with_deadline(
        &self,
        request: GenerationRequest,
        deadline: Duration,
    ) -> Result<GenerationResponse> {
        self.router.route_with_deadline(request, deadline).await
    }

    /// Enrich the request's prompt with retrieved context, then route it.
    ///
    /// `k` caps the number of passages requested (configured default when
    /// `None`). Without a configured retriever, or when retrieval yields
    /// nothing useful, the request is routed unchanged.
    pub async fn generate_with_context(
        &self,
        mut request: GenerationRequest,
        k: Option<usize>,
    ) -> Result<GenerationResponse> {
        if let Some(assembler) = &self.assembler {
            request.prompt = assembler.assemble(&request.prompt, k).await;
        }
        self.router.route(request).await
    }

    /// Providers in fallback preference order.
    pub fn providers(&self) -> Vec<ProviderId> {
        self.router.providers()
    }

    pub fn health_snapshot(&self) -> HashMap<ProviderId, HealthSnapshot> {
        self.router.health_snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.router.cache_stats()
    }
}

/// Staged construction of a [`Relay`].
///
/// Providers come from two sources that compose: adapters built from
/// `config.providers`, and instances registered directly with
/// [`register_provider`](Self::register_provider). A directly registered
/// provider wins over a configured adapter for the same id.
pub struct RelayBuilder {
    config: RelayConfig,
    providers: HashMap<ProviderId, Arc<dyn Provider>>,
    cache: Option<Arc<dyn ResponseCache>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    retriever: Option<Arc<dyn Retriever>>,
    instruction: Option<String>,
}

impl RelayBuilder {
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
            providers: HashMap::new(),
            cache: None,
            metrics: None,
            retriever: None,
            instruction: None,
        }
    }

    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a provider instance directly, bypassing adapter construction.
    pub fn register_provider(mut self, id: ProviderId, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(id, provider);
        self
    }

    /// Replace the default in-memory cache backend.
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enable retrieval-augmented context assembly.
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Override the instruction line prepended to context-enriched prompts.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn build(self) -> Result<Relay> {
        let Self {
            config,
            mut providers,
            cache,
            metrics,
            retriever,
            instruction,
        } = self;

        config.validate()?;

        for (id, settings) in &config.providers {
            if providers.contains_key(id) {
                continue;
            }
            let adapter = create_adapter(settings)
                .map_err(|e| Error::configuration(format!("provider {id}: {e}")))?;
            providers.insert(*id, adapter);
        }
        if providers.is_empty() {
            return Err(Error::NoProviders);
        }

        let cache: Arc<dyn ResponseCache> = match cache {
            Some(cache) => cache,
            None if config.cache.enabled => Arc::new(MemoryCache::new(
                config.cache.capacity,
                config.cache.ttl(),
            )),
            None => Arc::new(NullCache),
        };
        let metrics = metrics.unwrap_or_else(|| Arc::new(NoopMetrics));

        let assembler = retriever.map(|retriever| {
            let mut assembler = ContextAssembler::new(retriever, config.context.clone());
            if let Some(instruction) = instruction {
                assembler = assembler.with_instruction(instruction);
            }
            Arc::new(assembler)
        });

        info!(
            providers = providers.len(),
            cache = cache.name(),
            retrieval = assembler.is_some(),
            "relay constructed"
        );

        let router = Router::new(&config, providers, cache, metrics);
        Ok(Relay { router, assembler })
    }
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
