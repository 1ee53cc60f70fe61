//! LLM query expansion
//!
//! Short queries ("testigos bautismo", "eloos") embed poorly. The auxiliary
//! model rewrites them into a few fuller paraphrases that keep proper nouns
//! and sacramental terms verbatim; each paraphrase becomes its own search
//! branch. Queries of [`QueryExpansionConfig::threshold_chars`] characters or
//! more are searched as-is.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parish_chat_config::RagConfig;
use parish_chat_core::LanguageModel;
use parish_chat_llm::prompt::expansion_request;
use parish_chat_text_processing::{char_len, normalize};

/// Leading list markers: "1.", "2)", "-", "*", "•"
static LIST_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:\d+\s*[.)\-:]|[-*•])\s*").unwrap());

#[derive(Debug, Clone)]
pub struct QueryExpansionConfig {
    pub threshold_chars: usize,
    pub max_variants: usize,
    pub timeout: Duration,
}

impl From<&RagConfig> for QueryExpansionConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            threshold_chars: config.expansion_threshold_chars,
            max_variants: config.max_query_variants,
            timeout: Duration::from_millis(config.expansion_timeout_ms),
        }
    }
}

impl Default for QueryExpansionConfig {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

pub struct QueryExpander {
    model: Arc<dyn LanguageModel>,
    config: QueryExpansionConfig,
}

impl QueryExpander {
    pub fn new(model: Arc<dyn LanguageModel>, config: QueryExpansionConfig) -> Self {
        Self { model, config }
    }

    pub fn needs_expansion(&self, query: &str) -> bool {
        char_len(query) < self.config.threshold_chars
    }

    /// The query followed by up to `max_variants` paraphrases.
    ///
    /// Never fails: any model error or timeout yields just the query.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let query = query.trim().to_string();
        if !self.needs_expansion(&query) {
            tracing::debug!(chars = char_len(&query), "Query expansion skipped");
            return vec![query];
        }

        let call = self.model.generate(expansion_request(&query));
        let text = match tokio::time::timeout(self.config.timeout, call).await {
            Ok(Ok(response)) => response.text,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Query expansion failed, using original query");
                return vec![query];
            },
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Query expansion timed out, using original query"
                );
                return vec![query];
            },
        };

        let mut seen: HashSet<String> = HashSet::from([normalize(&query)]);
        let variants: Vec<String> = parse_variants(&text)
            .into_iter()
            .filter(|v| seen.insert(normalize(v)))
            .take(self.config.max_variants)
            .collect();

        tracing::debug!(query = %query, variants = variants.len(), "Query expanded");

        let mut queries = Vec::with_capacity(variants.len() + 1);
        queries.push(query);
        queries.extend(variants);
        queries
    }
}

/// One paraphrase per non-empty line, list markers and quotes stripped
pub fn parse_variants(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| LIST_MARKER.replace(line, ""))
        .map(|line| {
            line.trim()
                .trim_matches(|c: char| c == '"' || c == '“' || c == '”')
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}
