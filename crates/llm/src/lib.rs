//! Language model backends
//!
//! Features:
//! - OpenAI chat completions (answer generation, classification)
//! - OpenAI embeddings (query vectors for retrieval)
//! - Claude Messages API (query expansion, follow-up rewriting)
//! - Prompt construction shared by every backend

pub mod claude;
pub mod openai;
pub mod prompt;

pub use claude::{ClaudeBackend, ClaudeConfig};
pub use openai::{OpenAiBackend, OpenAiConfig, OpenAiEmbedder};
pub use prompt::{parse_classification, PromptBuilder};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for parish_chat_core::Error {
    fn from(err: LlmError) -> Self {
        parish_chat_core::Error::Llm(err.to_string())
    }
}
