//! Vector index backed by Qdrant
//!
//! Read-only: documents are ingested by a separate pipeline. Every scalar
//! payload field is surfaced as string metadata, so the passage text is
//! found under `pageContent` or `text`.

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{point_id::PointIdOptions, value::Kind, ScoredPoint, SearchPointsBuilder},
    Qdrant,
};
use std::collections::HashMap;

use parish_chat_config::RagConfig;
use parish_chat_core::{RetrievalCandidate, VectorIndex};

use crate::RagError;

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub endpoint: String,
    pub collection: String,
    /// Cloud deployments only
    pub api_key: Option<String>,
    pub vector_dim: usize,
}

impl From<&RagConfig> for VectorStoreConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            endpoint: config.qdrant_endpoint.clone(),
            collection: config.qdrant_collection.clone(),
            api_key: config.qdrant_api_key.clone(),
            vector_dim: config.vector_dim,
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

pub struct QdrantIndex {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl QdrantIndex {
    pub fn new(config: VectorStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Whether the collection exists and the server answers
    pub async fn is_ready(&self) -> Result<bool, RagError> {
        self.client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> parish_chat_core::Result<Vec<RetrievalCandidate>> {
        if embedding.len() != self.config.vector_dim {
            return Err(RagError::Search(format!(
                "query vector has {} dimensions, collection expects {}",
                embedding.len(),
                self.config.vector_dim
            ))
            .into());
        }

        let request = SearchPointsBuilder::new(
            &self.config.collection,
            embedding.to_vec(),
            top_k as u64,
        )
        .with_payload(true);

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        Ok(response.result.into_iter().map(to_candidate).collect())
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

fn to_candidate(point: ScoredPoint) -> RetrievalCandidate {
    let metadata: HashMap<String, String> = point
        .payload
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value.kind? {
                Kind::StringValue(s) => s,
                Kind::IntegerValue(n) => n.to_string(),
                Kind::DoubleValue(n) => n.to_string(),
                Kind::BoolValue(b) => b.to_string(),
                _ => return None,
            };
            Some((key, value))
        })
        .collect();

    let id = point
        .id
        .and_then(|pid| pid.point_id_options)
        .map(|options| match options {
            PointIdOptions::Uuid(u) => u,
            PointIdOptions::Num(n) => n.to_string(),
        })
        .unwrap_or_default();

    RetrievalCandidate {
        id,
        score: point.score,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{PointId, Value};

    fn value(kind: Kind) -> Value {
        Value { kind: Some(kind) }
    }

    #[test]
    fn test_scored_point_conversion() {
        let mut payload = HashMap::new();
        payload.insert(
            "pageContent".to_string(),
            value(Kind::StringValue("Cáritas atiende los martes.".to_string())),
        );
        payload.insert("pagina".to_string(), value(Kind::IntegerValue(3)));
        payload.insert("vacio".to_string(), Value { kind: None });

        let point = ScoredPoint {
            id: Some(PointId::from(42u64)),
            payload,
            score: 0.81,
            ..Default::default()
        };

        let candidate = to_candidate(point);
        assert_eq!(candidate.id, "42");
        assert_eq!(candidate.score, 0.81);
        assert_eq!(candidate.content(), Some("Cáritas atiende los martes."));
        assert_eq!(candidate.metadata.get("pagina").map(String::as_str), Some("3"));
        assert!(!candidate.metadata.contains_key("vacio"));
    }

    #[test]
    fn test_config_from_settings() {
        let rag = RagConfig {
            qdrant_collection: "parroquia".to_string(),
            ..RagConfig::default()
        };
        let config = VectorStoreConfig::from(&rag);
        assert_eq!(config.collection, "parroquia");
        assert_eq!(config.vector_dim, rag.vector_dim);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_before_network() {
        let index = QdrantIndex::new(VectorStoreConfig {
            endpoint: "http://localhost:6334".to_string(),
            vector_dim: 4,
            ..VectorStoreConfig::default()
        })
        .unwrap();

        let err = index.search(&[0.1, 0.2], 5).await.unwrap_err();
        assert!(err.to_string().contains("2 dimensions"));
    }
}
