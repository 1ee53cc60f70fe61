//! Vector index trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Result;

/// A document returned by a vector search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub id: String,
    /// Similarity reported by the index (cosine, higher is closer)
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RetrievalCandidate {
    /// Passage text, from `pageContent` or `text` metadata
    pub fn content(&self) -> Option<&str> {
        self.metadata
            .get("pageContent")
            .or_else(|| self.metadata.get("text"))
            .map(String::as_str)
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync + 'static {
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<RetrievalCandidate>>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_prefers_page_content() {
        let mut metadata = HashMap::new();
        metadata.insert("text".to_string(), "b".to_string());
        let mut c = RetrievalCandidate {
            id: "1".to_string(),
            score: 0.5,
            metadata,
        };
        assert_eq!(c.content(), Some("b"));

        c.metadata.insert("pageContent".to_string(), "a".to_string());
        assert_eq!(c.content(), Some("a"));
    }
}
