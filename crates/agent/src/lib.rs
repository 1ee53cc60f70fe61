//! Chat request orchestration
//!
//! Features:
//! - Canned replies for greetings, thanks and small talk
//! - Per-caller rate limiting
//! - Semantic response cache with topical exclusions
//! - Circuit breaker around the language model provider
//! - Follow-up rewriting using recent conversation turns
//! - Retrieval fusion and answer generation
//! - Quick-action buttons and form attachments for sign-up questions

pub mod conversational;
pub mod follow_up;
pub mod orchestrator;
pub mod quick_actions;
pub mod resources;

pub use conversational::{ConversationalFilter, ConversationalKind};
pub use follow_up::{FollowUpDetector, FollowUpRewriter};
pub use orchestrator::{AnswerSource, ChatOrchestrator, ChatReply, ChatRequest, OrchestratorConfig};
pub use quick_actions::{QuickActionDetector, QuickActions};
pub use resources::{Attachment, ResourceCatalog};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

impl From<parish_chat_llm::LlmError> for AgentError {
    fn from(err: parish_chat_llm::LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}

impl From<parish_chat_rag::RagError> for AgentError {
    fn from(err: parish_chat_rag::RagError) -> Self {
        AgentError::Retrieval(err.to_string())
    }
}

impl From<parish_chat_core::Error> for AgentError {
    fn from(err: parish_chat_core::Error) -> Self {
        match err {
            parish_chat_core::Error::Timeout(ms) => AgentError::Timeout(ms),
            parish_chat_core::Error::Rag(msg) => AgentError::Retrieval(msg),
            other => AgentError::Llm(other.to_string()),
        }
    }
}

impl From<AgentError> for parish_chat_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::InvalidInput(msg) => parish_chat_core::Error::InvalidInput(msg),
            AgentError::Timeout(ms) => parish_chat_core::Error::Timeout(ms),
            AgentError::Retrieval(msg) => parish_chat_core::Error::Rag(msg),
            AgentError::Llm(msg) => parish_chat_core::Error::Llm(msg),
        }
    }
}
