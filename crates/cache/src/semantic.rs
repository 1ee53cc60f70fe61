//! Semantic response cache
//!
//! Answers are stored under `{prefix}{normalized question}` with a
//! content-dependent TTL, and every written key is added to an index set.
//! Lookup tries the exact key first, then scans the index for the first live
//! entry whose normalized question is similar enough. Index members whose
//! entry has expired are removed lazily during scans and by [`cleanup`].
//!
//! Without a store the cache is a no-op: lookups miss and stores do nothing.
//!
//! [`cleanup`]: SemanticCache::cleanup

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use parish_chat_config::CacheConfig;
use parish_chat_core::{Clock, FailureReason, KeyValueStore, SystemClock};
use parish_chat_text_processing::{normalize, similarity};

use crate::policy::{CachePolicy, Exclusion};

/// Stored value. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub raw_question: String,
    pub normalized_question: String,
    pub answer: String,
    pub created_at_ms: i64,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HitKind {
    Exact,
    Fuzzy {
        similarity: f32,
        /// Original wording of the question that was cached
        matched_question: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub answer: String,
    pub kind: HitKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    Stored { key: String, ttl: Duration },
    Excluded(Exclusion),
    /// Nothing to key on (empty after normalization) or nothing to store
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntrySummary {
    pub question: String,
    pub age_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<CacheEntrySummary>,
}

pub struct SemanticCache {
    store: Option<Arc<dyn KeyValueStore>>,
    policy: CachePolicy,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl SemanticCache {
    /// `store: None` builds a no-op cache
    pub fn new(store: Option<Arc<dyn KeyValueStore>>, policy: CachePolicy, config: CacheConfig) -> Self {
        let store = if config.enabled { store } else { None };
        if store.is_none() {
            tracing::warn!("Semantic cache disabled - no shared store available");
        }
        Self {
            store,
            policy,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    fn backend(&self) -> Result<&Arc<dyn KeyValueStore>, FailureReason> {
        self.store.as_ref().ok_or(FailureReason::StoreDisabled)
    }

    fn key_for(&self, normalized: &str) -> Option<String> {
        if normalized.is_empty() {
            return None;
        }
        let key = format!("{}{}", self.config.key_prefix, normalized);
        (key != self.config.index_key).then_some(key)
    }

    /// Look up an answer, falling back to a miss on any store failure
    pub async fn lookup(&self, question: &str) -> Option<CacheHit> {
        match self.try_lookup(question).await {
            Ok(hit) => hit,
            Err(FailureReason::StoreDisabled) => None,
            Err(reason) => {
                tracing::warn!(error = %reason, kind = reason.kind(), "Cache lookup failed, treating as miss");
                None
            },
        }
    }

    pub async fn try_lookup(&self, question: &str) -> Result<Option<CacheHit>, FailureReason> {
        let normalized = normalize(question);

        if let Some(exclusion) = self.policy.exclusion(&normalized) {
            tracing::debug!(reason = exclusion.as_str(), "Cache skip");
            return Ok(None);
        }
        let Some(exact_key) = self.key_for(&normalized) else {
            return Ok(None);
        };
        let store = self.backend()?;

        if let Some(raw) = store.get(&exact_key).await? {
            match decode(&exact_key, &raw) {
                Ok(entry) => {
                    tracing::debug!(question = %question, "Cache hit (exact)");
                    return Ok(Some(CacheHit {
                        answer: entry.answer,
                        kind: HitKind::Exact,
                    }));
                },
                Err(reason) => tracing::warn!(error = %reason, "Ignoring malformed cache entry"),
            }
        }

        for key in store.list_set(&self.config.index_key).await? {
            if key == exact_key {
                continue;
            }
            let Some(raw) = store.get(&key).await? else {
                self.forget(store, &key).await;
                continue;
            };
            let entry = match decode(&key, &raw) {
                Ok(entry) => entry,
                Err(reason) => {
                    tracing::warn!(error = %reason, "Ignoring malformed cache entry");
                    continue;
                },
            };

            let score = similarity(&normalized, &entry.normalized_question);
            if score >= self.config.similarity_threshold {
                tracing::debug!(
                    question = %question,
                    matched = %entry.raw_question,
                    similarity = score,
                    "Cache hit (fuzzy)"
                );
                return Ok(Some(CacheHit {
                    answer: entry.answer,
                    kind: HitKind::Fuzzy {
                        similarity: score,
                        matched_question: entry.raw_question,
                    },
                }));
            }
        }

        tracing::debug!(question = %question, "Cache miss");
        Ok(None)
    }

    /// Store an answer, ignoring store failures
    pub async fn store(&self, question: &str, answer: &str) -> StoreOutcome {
        match self.try_store(question, answer).await {
            Ok(outcome) => outcome,
            Err(FailureReason::StoreDisabled) => StoreOutcome::Skipped,
            Err(reason) => {
                tracing::warn!(error = %reason, kind = reason.kind(), "Cache store failed");
                StoreOutcome::Skipped
            },
        }
    }

    pub async fn try_store(&self, question: &str, answer: &str) -> Result<StoreOutcome, FailureReason> {
        let normalized = normalize(question);

        if let Some(exclusion) = self.policy.exclusion(&normalized) {
            return Ok(StoreOutcome::Excluded(exclusion));
        }
        let Some(key) = self.key_for(&normalized) else {
            return Ok(StoreOutcome::Skipped);
        };
        if answer.trim().is_empty() {
            return Ok(StoreOutcome::Skipped);
        }
        let store = self.backend()?;

        let ttl = self.policy.ttl_for(&normalized);
        let entry = CacheEntry {
            raw_question: question.to_string(),
            normalized_question: normalized,
            answer: answer.to_string(),
            created_at_ms: self.clock.now_ms(),
            ttl_seconds: ttl.as_secs(),
        };
        let value = serde_json::to_string(&entry).map_err(|e| FailureReason::malformed(&key, e))?;

        store.set(&key, &value, Some(ttl)).await?;
        // the index itself never expires; stale members are pruned by cleanup
        store.add_to_set(&self.config.index_key, &key).await?;

        tracing::debug!(question = %question, ttl_secs = ttl.as_secs(), "Cache stored");
        Ok(StoreOutcome::Stored { key, ttl })
    }

    /// Drop index members whose entry has expired. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        match self.try_cleanup().await {
            Ok(removed) => removed,
            Err(FailureReason::StoreDisabled) => 0,
            Err(reason) => {
                tracing::warn!(error = %reason, "Cache cleanup failed");
                0
            },
        }
    }

    pub async fn try_cleanup(&self) -> Result<usize, FailureReason> {
        let store = self.backend()?;
        let mut removed = 0;

        for key in store.list_set(&self.config.index_key).await? {
            if !store.exists(&key).await? {
                store.remove_from_set(&self.config.index_key, &key).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Cache index cleaned");
        }
        Ok(removed)
    }

    /// Live entries with their age
    pub async fn stats(&self) -> Result<CacheStats, FailureReason> {
        let store = self.backend()?;
        let now = self.clock.now_ms();
        let mut entries = Vec::new();

        for key in store.list_set(&self.config.index_key).await? {
            let Some(raw) = store.get(&key).await? else {
                continue;
            };
            if let Ok(entry) = decode(&key, &raw) {
                entries.push(CacheEntrySummary {
                    question: entry.raw_question,
                    age_minutes: (now - entry.created_at_ms).max(0) / 60_000,
                });
            }
        }

        Ok(CacheStats {
            size: entries.len(),
            entries,
        })
    }

    /// Delete every indexed entry and the index. Returns how many entries were deleted.
    pub async fn clear(&self) -> Result<usize, FailureReason> {
        let store = self.backend()?;
        let mut deleted = 0;

        for key in store.list_set(&self.config.index_key).await? {
            if store.del(&key).await? {
                deleted += 1;
            }
        }
        store.del(&self.config.index_key).await?;

        tracing::info!(deleted, "Cache cleared");
        Ok(deleted)
    }

    async fn forget(&self, store: &Arc<dyn KeyValueStore>, key: &str) {
        if let Err(e) = store.remove_from_set(&self.config.index_key, key).await {
            tracing::debug!(key = %key, error = %e, "Could not prune expired index member");
        }
    }
}

fn decode(key: &str, raw: &str) -> Result<CacheEntry, FailureReason> {
    serde_json::from_str(raw).map_err(|e| FailureReason::malformed(key, e))
}
