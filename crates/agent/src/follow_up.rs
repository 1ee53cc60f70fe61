//! Follow-up detection and rewriting
//!
//! "¿y Bartimeo?" only makes sense next to the previous turns. Such messages
//! are rewritten into a self-contained question by the auxiliary model before
//! retrieval. The rewrite is best effort: on any failure the original message
//! is used.

use std::sync::Arc;
use std::time::Duration;

use parish_chat_config::constants::chat::{FOLLOW_UP_BARE_MAX_CHARS, FOLLOW_UP_STARTER_MAX_CHARS};
use parish_chat_config::{ChatConfig, DomainConfig};
use parish_chat_core::{recent_turns, ChatTurn, LanguageModel};
use parish_chat_llm::prompt::rewrite_request;
use parish_chat_text_processing::{char_len, normalize, KeywordSet};

use crate::AgentError;

pub struct FollowUpDetector {
    starters: KeywordSet,
    question_words: KeywordSet,
}

impl FollowUpDetector {
    pub fn new(domain: &DomainConfig) -> Self {
        Self {
            starters: KeywordSet::new(&domain.conversational.follow_up_starters),
            question_words: KeywordSet::new(&domain.conversational.question_words),
        }
    }

    /// Short and either opens with a connector or lacks any question word
    pub fn is_follow_up(&self, message: &str) -> bool {
        let length = char_len(message.trim());
        let normalized = normalize(message);
        if normalized.is_empty() {
            return false;
        }

        if length < FOLLOW_UP_STARTER_MAX_CHARS && self.starters.starts(&normalized) {
            return true;
        }

        length < FOLLOW_UP_BARE_MAX_CHARS && !self.question_words.matches(&normalized)
    }
}

pub struct FollowUpRewriter {
    model: Arc<dyn LanguageModel>,
    detector: FollowUpDetector,
    history_window: usize,
    max_chars: usize,
    timeout: Duration,
}

impl FollowUpRewriter {
    pub fn new(model: Arc<dyn LanguageModel>, domain: &DomainConfig, config: &ChatConfig) -> Self {
        Self {
            model,
            detector: FollowUpDetector::new(domain),
            history_window: config.rewrite_history_window,
            max_chars: config.rewrite_max_chars,
            timeout: Duration::from_millis(config.rewrite_timeout_ms),
        }
    }

    /// A follow-up with some history to resolve it against
    pub fn needs_rewrite(&self, message: &str, history: &[ChatTurn]) -> bool {
        !history.is_empty()
            && char_len(message.trim()) < self.max_chars
            && self.detector.is_follow_up(message)
    }

    pub async fn try_rewrite(&self, message: &str, history: &[ChatTurn]) -> Result<String, AgentError> {
        let request = rewrite_request(message, recent_turns(history, self.history_window));

        let response = tokio::time::timeout(self.timeout, self.model.generate(request))
            .await
            .map_err(|_| AgentError::Timeout(self.timeout.as_millis() as u64))??;

        let rewritten = response
            .text
            .trim()
            .trim_matches(|c: char| c == '"' || c == '“' || c == '”')
            .trim()
            .to_string();

        if rewritten.is_empty() {
            return Err(AgentError::Llm("empty rewrite".to_string()));
        }
        Ok(rewritten)
    }

    /// Rewrite, falling back to the original message
    pub async fn rewrite(&self, message: &str, history: &[ChatTurn]) -> String {
        match self.try_rewrite(message, history).await {
            Ok(rewritten) => {
                tracing::debug!(original = %message, rewritten = %rewritten, "Follow-up rewritten");
                rewritten
            },
            Err(e) => {
                tracing::warn!(error = %e, "Follow-up rewrite failed, using original message");
                message.to_string()
            },
        }
    }
}
