//! Retrieval with query expansion and reciprocal rank fusion
//!
//! Features:
//! - Dense vector search via Qdrant
//! - LLM paraphrasing of short, under-specified queries
//! - Parallel embed-and-search branches, one per query variant
//! - Reciprocal Rank Fusion across branches
//! - Relevance floor on the original similarity

pub mod fusion;
pub mod query_expansion;
pub mod retriever;
pub mod vector_store;

pub use fusion::{reciprocal_rank_fusion, FusedCandidate};
pub use query_expansion::{parse_variants, QueryExpander, QueryExpansionConfig};
pub use retriever::{FusionRetriever, Passage, RetrievalReport, RetrieverConfig};
pub use vector_store::{QdrantIndex, VectorStoreConfig};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("All {failed} retrieval branches failed: {last_error}")]
    AllBranchesFailed { failed: usize, last_error: String },
}

impl From<RagError> for parish_chat_core::Error {
    fn from(err: RagError) -> Self {
        parish_chat_core::Error::Rag(err.to_string())
    }
}
