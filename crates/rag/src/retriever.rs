//! Fusion retriever
//!
//! Expands the query, runs one embed-and-search branch per query variant in
//! parallel, fuses the ranked lists with RRF and keeps the passages whose
//! original similarity clears the relevance floor.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use parish_chat_config::RagConfig;
use parish_chat_core::{EmbeddingProvider, RetrievalCandidate, VectorIndex};
use parish_chat_text_processing::char_len;

use crate::fusion::{reciprocal_rank_fusion, FusedCandidate};
use crate::query_expansion::QueryExpander;
use crate::RagError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Candidates requested from the index per branch
    pub top_k: usize,
    pub rrf_k: f32,
    /// Passages at or below this similarity are dropped
    pub relevance_floor: f32,
    /// Passages handed to generation
    pub final_top_k: usize,
    pub max_passage_chars: usize,
    pub branch_timeout: Duration,
}

impl From<&RagConfig> for RetrieverConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            top_k: config.top_k,
            rrf_k: config.rrf_k,
            relevance_floor: config.relevance_floor,
            final_top_k: config.final_top_k,
            max_passage_chars: config.max_passage_chars,
            branch_timeout: Duration::from_millis(config.branch_timeout_ms),
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

/// A fused, filtered and trimmed search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
    /// Best similarity reported by any branch
    pub similarity: f32,
    pub rrf_score: f32,
    /// Number of branches that returned this passage
    pub hits: usize,
}

impl Passage {
    fn from_fused(fused: FusedCandidate, max_chars: usize) -> Option<Self> {
        let text = truncate_passage(fused.candidate.content()?, max_chars);
        if text.is_empty() {
            return None;
        }
        Some(Self {
            id: fused.candidate.id,
            text,
            similarity: fused.candidate.score,
            rrf_score: fused.rrf_score,
            hits: fused.hits,
        })
    }
}

/// Outcome of one retrieval
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalReport {
    /// Original query first, then any paraphrases
    pub queries: Vec<String>,
    pub passages: Vec<Passage>,
    /// Distinct candidates before the relevance floor
    pub fused_count: usize,
    /// Branches that failed or timed out
    pub failed_branches: usize,
}

impl RetrievalReport {
    /// No passage cleared the relevance floor
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        self.failed_branches > 0
    }

    pub fn passage_texts(&self) -> Vec<String> {
        self.passages.iter().map(|p| p.text.clone()).collect()
    }
}

/// Query-expanding, rank-fusing retriever
pub struct FusionRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    expander: Option<QueryExpander>,
    config: RetrieverConfig,
}

impl FusionRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            expander: None,
            config,
        }
    }

    /// Enable paraphrasing of short queries
    pub fn with_expander(mut self, expander: QueryExpander) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Retrieve passages for a query.
    ///
    /// Failed or timed-out branches are left out of fusion and counted in
    /// [`RetrievalReport::failed_branches`]. Only when every branch fails is
    /// an error returned.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalReport, RagError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(RetrievalReport::default());
        }

        let queries = match &self.expander {
            Some(expander) => expander.expand(query).await,
            None => vec![query.to_string()],
        };

        let start = std::time::Instant::now();
        let results = join_all(queries.iter().map(|q| self.branch(q))).await;

        let mut lists = Vec::with_capacity(results.len());
        let mut failed = 0;
        let mut last_error = None;
        for (variant, result) in queries.iter().zip(results) {
            match result {
                Ok(list) => lists.push(list),
                Err(e) => {
                    tracing::warn!(query = %variant, error = %e, "Retrieval branch failed");
                    failed += 1;
                    last_error = Some(e.to_string());
                },
            }
        }

        if lists.is_empty() {
            return Err(RagError::AllBranchesFailed {
                failed,
                last_error: last_error.unwrap_or_default(),
            });
        }

        let fused = reciprocal_rank_fusion(&lists, self.config.rrf_k);
        let fused_count = fused.len();

        let passages: Vec<Passage> = fused
            .into_iter()
            .filter(|f| f.candidate.score > self.config.relevance_floor)
            .filter_map(|f| Passage::from_fused(f, self.config.max_passage_chars))
            .take(self.config.final_top_k)
            .collect();

        tracing::debug!(
            branches = queries.len(),
            failed,
            fused = fused_count,
            kept = passages.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Retrieval finished"
        );

        Ok(RetrievalReport {
            queries,
            passages,
            fused_count,
            failed_branches: failed,
        })
    }

    async fn branch(&self, query: &str) -> Result<Vec<RetrievalCandidate>, RagError> {
        let search = async {
            let embedding = self
                .embedder
                .embed(query)
                .await
                .map_err(|e| RagError::Embedding(e.to_string()))?;
            self.index
                .search(&embedding, self.config.top_k)
                .await
                .map_err(|e| RagError::Search(e.to_string()))
        };

        tokio::time::timeout(self.config.branch_timeout, search)
            .await
            .map_err(|_| {
                RagError::Search(format!(
                    "branch timed out after {}ms",
                    self.config.branch_timeout.as_millis()
                ))
            })?
    }
}

/// Trim and cut to `max_chars` characters, marking the cut with "..."
fn truncate_passage(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if char_len(text) <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
