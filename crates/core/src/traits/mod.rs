//! Backend traits for the chat pipeline
//!
//! ```text
//! Shared state:
//!   - KeyValueStore: TTL'd strings, counters and sets (Redis or in-memory)
//!
//! Language models:
//!   - LanguageModel: generation and intent classification
//!   - EmbeddingProvider: text → dense vector
//!
//! Retrieval:
//!   - VectorIndex: nearest-neighbour search over parish documents
//! ```

mod llm;
mod retrieval;
mod store;

pub use llm::{EmbeddingProvider, LanguageModel};
pub use retrieval::{RetrievalCandidate, VectorIndex};
pub use store::{KeyValueStore, StoreError};
