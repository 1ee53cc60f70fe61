//! Core traits and types for the parish chat backend
//!
//! This crate provides foundational types used across all other crates:
//! - Backend traits (shared key-value store, vector index, embeddings, LLM)
//! - Failure reasons for fail-open components
//! - Clock abstraction for time-dependent state
//! - Conversation and LLM message types
//! - Error types

pub mod clock;
pub mod conversation;
pub mod error;
pub mod failure;
pub mod llm_types;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conversation::{recent_turns, render_transcript, ChatTurn, TurnRole};
pub use error::{Error, Result};
pub use failure::FailureReason;
pub use llm_types::{Classification, GenerateRequest, GenerateResponse, Message, Role};
pub use traits::{
    EmbeddingProvider, KeyValueStore, LanguageModel, RetrievalCandidate, StoreError, VectorIndex,
};
