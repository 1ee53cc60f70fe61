//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use parish_chat_agent::{ChatOrchestrator, FollowUpRewriter, OrchestratorConfig};
use parish_chat_cache::{CachePolicy, SemanticCache};
use parish_chat_config::{DomainConfig, RagConfig, Settings};
use parish_chat_core::{EmbeddingProvider, KeyValueStore, LanguageModel, VectorIndex};
use parish_chat_rag::{FusionRetriever, QueryExpander, QueryExpansionConfig, RetrieverConfig};
use parish_chat_resilience::{CircuitBreaker, RateLimiter};

/// External systems the pipeline talks to
pub struct Backends {
    /// `None` runs every store-backed component in its fallback mode
    pub store: Option<Arc<dyn KeyValueStore>>,
    /// Answer generation
    pub model: Arc<dyn LanguageModel>,
    /// Query expansion and follow-up rewriting
    pub auxiliary: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub cache: Arc<SemanticCache>,
    pub breaker: Arc<CircuitBreaker>,
    pub store: Option<Arc<dyn KeyValueStore>>,
    /// Set when the Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the pipeline from settings and backends
    pub fn build(config: Settings, domain: &DomainConfig, backends: Backends) -> Self {
        let store = backends.store;

        let limiter = Arc::new(RateLimiter::new(store.clone(), &config.rate_limit));
        let cache = Arc::new(SemanticCache::new(
            store.clone(),
            CachePolicy::new(domain, &config.cache),
            config.cache.clone(),
        ));
        let breaker = Arc::new(CircuitBreaker::new(store.clone(), config.breaker.clone()));

        let mut orchestrator = ChatOrchestrator::new(
            domain,
            limiter,
            cache.clone(),
            breaker.clone(),
            backends.model,
            OrchestratorConfig::from_settings(&config.chat, &config.llm),
        );

        if config.rag.enabled {
            orchestrator = orchestrator.with_retriever(Arc::new(build_retriever(
                &config.rag,
                backends.embedder,
                backends.index,
                backends.auxiliary.clone(),
            )));
        } else {
            tracing::warn!("Retrieval disabled, answers come from the model alone");
        }

        if config.chat.rewrite_enabled {
            orchestrator = orchestrator.with_rewriter(FollowUpRewriter::new(
                backends.auxiliary,
                domain,
                &config.chat,
            ));
        }

        tracing::info!(
            store = store.as_ref().map(|s| s.name()).unwrap_or("none"),
            cache_enabled = cache.is_enabled(),
            rag_enabled = config.rag.enabled,
            "Initialized application state"
        );

        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            cache,
            breaker,
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}

/// Fusion retriever with LLM query expansion, shared by the server and the search CLI
pub fn build_retriever(
    config: &RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    auxiliary: Arc<dyn LanguageModel>,
) -> FusionRetriever {
    FusionRetriever::new(embedder, index, RetrieverConfig::from(config))
        .with_expander(QueryExpander::new(auxiliary, QueryExpansionConfig::from(config)))
}
