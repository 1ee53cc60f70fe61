//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{breaker, cache, chat, endpoints, models, rag, rate_limit, timeouts};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation, warnings only
    #[default]
    Development,
    Staging,
    /// All validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Shared coordination store (Redis)
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Path to the parish vocabulary file (YAML); missing file means defaults
    #[serde(default = "default_domain_config_path")]
    pub domain_config_path: String,
}

fn default_domain_config_path() -> String {
    "config/domain.yaml".to_string()
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed origins; empty means localhost only
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Trust the `X-User-Id`, `X-Forwarded-For` and `X-Real-IP` headers for caller identity
    #[serde(default = "default_true")]
    pub trust_forwarded_for: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    timeouts::HTTP_REQUEST_SECS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            request_timeout_secs: default_request_timeout(),
            trust_forwarded_for: true,
        }
    }
}

/// Shared store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Disabled means every fail-open component uses its fallback
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_redis_url")]
    pub url: String,

    #[serde(default = "default_store_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_store_command_timeout")]
    pub command_timeout_ms: u64,
}

fn default_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| endpoints::REDIS_DEFAULT.to_string())
}

fn default_store_connect_timeout() -> u64 {
    timeouts::STORE_CONNECT_MS
}

fn default_store_command_timeout() -> u64 {
    timeouts::STORE_COMMAND_MS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_redis_url(),
            connect_timeout_ms: default_store_connect_timeout(),
            command_timeout_ms: default_store_command_timeout(),
        }
    }
}

/// Semantic response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default = "default_stable_ttl_secs")]
    pub stable_ttl_secs: u64,

    #[serde(default = "default_group_ttl_secs")]
    pub group_ttl_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    #[serde(default = "default_cache_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_cache_index")]
    pub index_key: String,
}

fn default_similarity_threshold() -> f32 {
    cache::SIMILARITY_THRESHOLD
}

fn default_ttl_secs() -> u64 {
    cache::DEFAULT_TTL_SECS
}

fn default_stable_ttl_secs() -> u64 {
    cache::STABLE_TTL_SECS
}

fn default_group_ttl_secs() -> u64 {
    cache::GROUP_TTL_SECS
}

fn default_cleanup_interval() -> u64 {
    cache::CLEANUP_INTERVAL_SECS
}

fn default_cache_prefix() -> String {
    cache::KEY_PREFIX.to_string()
}

fn default_cache_index() -> String {
    cache::INDEX_KEY.to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: default_similarity_threshold(),
            default_ttl_secs: default_ttl_secs(),
            stable_ttl_secs: default_stable_ttl_secs(),
            group_ttl_secs: default_group_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval(),
            key_prefix: default_cache_prefix(),
            index_key: default_cache_index(),
        }
    }
}

/// Per-caller rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    #[serde(default = "default_rate_limit_prefix")]
    pub key_prefix: String,
}

fn default_max_requests() -> u32 {
    rate_limit::MAX_REQUESTS
}

fn default_window_ms() -> u64 {
    rate_limit::WINDOW_MS
}

fn default_rate_limit_prefix() -> String {
    rate_limit::KEY_PREFIX.to_string()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            key_prefix: default_rate_limit_prefix(),
        }
    }
}

/// Circuit breaker around the LLM/embedding provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_breaker_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_half_open_probes")]
    pub half_open_max_probes: u32,

    #[serde(default = "default_breaker_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_failure_threshold() -> u32 {
    breaker::FAILURE_THRESHOLD
}

fn default_breaker_timeout() -> u64 {
    breaker::TIMEOUT_MS
}

fn default_half_open_probes() -> u32 {
    breaker::HALF_OPEN_MAX_PROBES
}

fn default_breaker_prefix() -> String {
    breaker::KEY_PREFIX.to_string()
}

fn default_service_name() -> String {
    breaker::LLM_SERVICE.to_string()
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            timeout_ms: default_breaker_timeout(),
            half_open_max_probes: default_half_open_probes(),
            key_prefix: default_breaker_prefix(),
            service_name: default_service_name(),
        }
    }
}

/// Retrieval fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    #[serde(default = "default_collection")]
    pub qdrant_collection: String,

    #[serde(default = "default_qdrant_api_key")]
    pub qdrant_api_key: Option<String>,

    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f32,

    #[serde(default = "default_expansion_threshold")]
    pub expansion_threshold_chars: usize,

    #[serde(default = "default_max_variants")]
    pub max_query_variants: usize,

    #[serde(default = "default_final_top_k")]
    pub final_top_k: usize,

    #[serde(default = "default_max_passage_chars")]
    pub max_passage_chars: usize,

    #[serde(default = "default_branch_timeout")]
    pub branch_timeout_ms: u64,

    #[serde(default = "default_expansion_timeout")]
    pub expansion_timeout_ms: u64,
}

fn default_qdrant_endpoint() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| endpoints::QDRANT_DEFAULT.to_string())
}

fn default_collection() -> String {
    rag::COLLECTION.to_string()
}

fn default_qdrant_api_key() -> Option<String> {
    std::env::var("QDRANT_API_KEY").ok().filter(|k| !k.is_empty())
}

fn default_vector_dim() -> usize {
    rag::EMBEDDING_DIM
}

fn default_top_k() -> usize {
    rag::TOP_K
}

fn default_rrf_k() -> f32 {
    rag::RRF_K
}

fn default_relevance_floor() -> f32 {
    rag::RELEVANCE_FLOOR
}

fn default_expansion_threshold() -> usize {
    rag::EXPANSION_THRESHOLD_CHARS
}

fn default_max_variants() -> usize {
    rag::MAX_QUERY_VARIANTS
}

fn default_final_top_k() -> usize {
    rag::FINAL_TOP_K
}

fn default_max_passage_chars() -> usize {
    rag::MAX_PASSAGE_CHARS
}

fn default_branch_timeout() -> u64 {
    timeouts::RETRIEVAL_BRANCH_MS
}

fn default_expansion_timeout() -> u64 {
    timeouts::EXPANSION_MS
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_collection: default_collection(),
            qdrant_api_key: default_qdrant_api_key(),
            vector_dim: default_vector_dim(),
            top_k: default_top_k(),
            rrf_k: default_rrf_k(),
            relevance_floor: default_relevance_floor(),
            expansion_threshold_chars: default_expansion_threshold(),
            max_query_variants: default_max_variants(),
            final_top_k: default_final_top_k(),
            max_passage_chars: default_max_passage_chars(),
            branch_timeout_ms: default_branch_timeout(),
            expansion_timeout_ms: default_expansion_timeout(),
        }
    }
}

/// Provider configuration (OpenAI for chat/embeddings, Anthropic for
/// rewriting and query expansion)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_openai_endpoint")]
    pub openai_endpoint: String,

    #[serde(default = "default_openai_key")]
    pub openai_api_key: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_anthropic_endpoint")]
    pub anthropic_endpoint: String,

    #[serde(default = "default_anthropic_key")]
    pub anthropic_api_key: String,

    /// Model used for query expansion and follow-up rewriting
    #[serde(default = "default_auxiliary_model")]
    pub auxiliary_model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_ms: u64,
}

fn default_openai_endpoint() -> String {
    endpoints::OPENAI_DEFAULT.to_string()
}

fn default_openai_key() -> String {
    std::env::var("OPENAI_API_KEY").unwrap_or_default()
}

fn default_chat_model() -> String {
    std::env::var("OPENAI_AGENT_MODEL").unwrap_or_else(|_| models::CHAT_DEFAULT.to_string())
}

fn default_embedding_model() -> String {
    models::EMBEDDING_DEFAULT.to_string()
}

fn default_anthropic_endpoint() -> String {
    endpoints::ANTHROPIC_DEFAULT.to_string()
}

fn default_anthropic_key() -> String {
    std::env::var("ANTHROPIC_API_KEY").unwrap_or_default()
}

fn default_auxiliary_model() -> String {
    models::AUXILIARY_DEFAULT.to_string()
}

fn default_max_tokens() -> u32 {
    800
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.7
}

fn default_generation_timeout() -> u64 {
    timeouts::GENERATION_MS
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_endpoint: default_openai_endpoint(),
            openai_api_key: default_openai_key(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            anthropic_endpoint: default_anthropic_endpoint(),
            anthropic_api_key: default_anthropic_key(),
            auxiliary_model: default_auxiliary_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            generation_timeout_ms: default_generation_timeout(),
        }
    }
}

/// Conversation handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default = "default_rewrite_history_window")]
    pub rewrite_history_window: usize,

    #[serde(default = "default_true")]
    pub rewrite_enabled: bool,

    #[serde(default = "default_rewrite_max_chars")]
    pub rewrite_max_chars: usize,

    #[serde(default = "default_rewrite_timeout")]
    pub rewrite_timeout_ms: u64,

    /// Ask the model to label questions before retrieval
    #[serde(default)]
    pub intent_classification: bool,
}

fn default_history_window() -> usize {
    chat::HISTORY_WINDOW
}

fn default_rewrite_history_window() -> usize {
    chat::REWRITE_HISTORY_WINDOW
}

fn default_rewrite_max_chars() -> usize {
    chat::REWRITE_MAX_CHARS
}

fn default_rewrite_timeout() -> u64 {
    timeouts::REWRITE_MS
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            rewrite_history_window: default_rewrite_history_window(),
            rewrite_enabled: true,
            rewrite_max_chars: default_rewrite_max_chars(),
            rewrite_timeout_ms: default_rewrite_timeout(),
            intent_classification: false,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_cache()?;
        self.validate_rate_limit()?;
        self.validate_breaker()?;
        self.validate_rag()?;
        self.validate_llm()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    fn validate_cache(&self) -> Result<(), ConfigError> {
        let cache = &self.cache;

        if !(0.0..=1.0).contains(&cache.similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "cache.similarity_threshold".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    cache.similarity_threshold
                ),
            });
        }

        for (field, ttl) in [
            ("cache.default_ttl_secs", cache.default_ttl_secs),
            ("cache.stable_ttl_secs", cache.stable_ttl_secs),
            ("cache.group_ttl_secs", cache.group_ttl_secs),
            ("cache.cleanup_interval_secs", cache.cleanup_interval_secs),
        ] {
            if ttl == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "Must be greater than 0".to_string(),
                });
            }
        }

        if cache.key_prefix.is_empty() || cache.index_key == cache.key_prefix {
            return Err(ConfigError::InvalidValue {
                field: "cache.key_prefix".to_string(),
                message: "Prefix must be non-empty and differ from the index key".to_string(),
            });
        }

        Ok(())
    }

    fn validate_rate_limit(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.max_requests".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if self.rate_limit.window_ms < 1000 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.window_ms".to_string(),
                message: format!("Window too short (minimum 1000ms), got {}", self.rate_limit.window_ms),
            });
        }
        Ok(())
    }

    fn validate_breaker(&self) -> Result<(), ConfigError> {
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "breaker.failure_threshold".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if self.breaker.half_open_max_probes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "breaker.half_open_max_probes".to_string(),
                message: "Must allow at least one trial call".to_string(),
            });
        }
        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        if !(0.0..=1.0).contains(&rag.relevance_floor) {
            return Err(ConfigError::InvalidValue {
                field: "rag.relevance_floor".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", rag.relevance_floor),
            });
        }

        if rag.rrf_k <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.rrf_k".to_string(),
                message: format!("Must be positive, got {}", rag.rrf_k),
            });
        }

        if rag.top_k == 0 || rag.final_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.top_k".to_string(),
                message: "top_k and final_top_k must be greater than 0".to_string(),
            });
        }

        if rag.vector_dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.vector_dim".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            });
        }

        if self.environment.is_strict() && self.llm.openai_api_key.is_empty() {
            return Err(ConfigError::MissingField("llm.openai_api_key".to_string()));
        }

        Ok(())
    }
}

/// Load settings from files and environment
///
/// Priority: env vars > config/{env} > config/default > code defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from("config", env)
}

/// Load settings with an explicit config directory
pub fn load_settings_from(config_dir: &str, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name(&format!("{}/default", config_dir)).required(false));

    if let Some(env_name) = env {
        builder = builder
            .add_source(File::with_name(&format!("{}/{}", config_dir, env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("PARISH_CHAT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
