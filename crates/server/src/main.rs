//! Parish Chat Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use parish_chat_cache::SemanticCache;
use parish_chat_config::{load_settings, DomainConfig, Settings};
use parish_chat_core::{KeyValueStore, LanguageModel};
use parish_chat_llm::{ClaudeBackend, ClaudeConfig, OpenAiBackend, OpenAiConfig, OpenAiEmbedder};
use parish_chat_persistence::PersistenceError;
use parish_chat_rag::{QdrantIndex, VectorStoreConfig};
use parish_chat_server::{create_router, init_metrics, AppState, Backends};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("PARISH_CHAT_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        },
    };

    init_tracing(&config);

    tracing::info!("Starting Parish Chat Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let domain = DomainConfig::load(&config.domain_config_path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load parish vocabulary, using built-in defaults");
        DomainConfig::default()
    });

    let metrics = if config.observability.metrics_enabled {
        match init_metrics() {
            Ok(handle) => {
                tracing::info!("Initialized Prometheus metrics at /metrics");
                Some(handle)
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install metrics recorder");
                None
            },
        }
    } else {
        None
    };

    let store = connect_store(&config).await;

    let model: Arc<dyn LanguageModel> =
        Arc::new(OpenAiBackend::new(OpenAiConfig::from_settings(&config.llm))?);
    let auxiliary: Arc<dyn LanguageModel> = if config.llm.anthropic_api_key.is_empty() {
        tracing::info!("No Anthropic key, using the chat model for rewriting and expansion");
        model.clone()
    } else {
        Arc::new(ClaudeBackend::new(ClaudeConfig::from_settings(&config.llm))?)
    };
    let embedder = Arc::new(OpenAiEmbedder::new(&config.llm, config.rag.vector_dim)?);
    let index = Arc::new(QdrantIndex::new(VectorStoreConfig::from(&config.rag))?);
    tracing::info!(
        endpoint = %config.rag.qdrant_endpoint,
        collection = %config.rag.qdrant_collection,
        "Vector index configured"
    );

    let cleanup_interval = Duration::from_secs(config.cache.cleanup_interval_secs);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let state = AppState::build(
        config,
        &domain,
        Backends {
            store,
            model,
            auxiliary,
            embedder,
            index,
        },
    )
    .with_metrics(metrics);

    let cleanup = spawn_cache_cleanup(state.cache.clone(), cleanup_interval);
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Connect the shared store; without it the cache, limiter and breaker fail open
async fn connect_store(config: &Settings) -> Option<Arc<dyn KeyValueStore>> {
    match parish_chat_persistence::connect(&config.store).await {
        Ok(store) => Some(store),
        Err(PersistenceError::Disabled) => {
            tracing::info!("Shared store disabled, running without cache or rate limits");
            None
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect shared store, continuing without it");
            None
        },
    }
}

/// Prune expired cache entries on a fixed interval
fn spawn_cache_cleanup(cache: Arc<SemanticCache>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.cleanup().await;
            if removed > 0 {
                tracing::info!(removed, "Expired cache entries pruned");
            }
        }
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("parish_chat={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
