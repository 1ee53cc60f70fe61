//! Configuration management for the parish chat backend
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (`PARISH_CHAT__` prefix, `__` separator)
//! - Well-known provider variables (`REDIS_URL`, `OPENAI_API_KEY`, ...)
//!
//! Parish vocabulary (cache exclusions, TTL families, quick-action topics,
//! resource catalogue, canned replies) lives in [`DomainConfig`], which has
//! code defaults and can be overridden from `config/domain.yaml`.

pub mod constants;
pub mod domain;
pub mod settings;

pub use domain::{
    CannedReplies, ConversationalVocabulary, DomainConfig, QuickActionButton, QuickActionKind,
    QuickActionVocabulary, ResourceEntry, ResourceKind, TopicCategory, TopicMapping,
    TtlVocabulary,
};
pub use settings::{
    load_settings, load_settings_from, BreakerConfig, CacheConfig, ChatConfig, LlmConfig,
    ObservabilityConfig, RagConfig, RateLimitConfig, RuntimeEnvironment, ServerConfig, Settings,
    StoreConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
