//! Conversational pre-filter
//!
//! Greetings, thanks and small talk get a canned reply before any store or
//! provider is touched. A greeting followed by a real question ("hola, ¿a qué
//! hora abre Cáritas?") is not small talk and goes through the pipeline.

use serde::Serialize;

use parish_chat_config::constants::chat::CHITCHAT_MAX_TOKENS;
use parish_chat_config::{CannedReplies, DomainConfig};
use parish_chat_text_processing::{normalize, tokenize, KeywordSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationalKind {
    Greeting,
    Acknowledgment,
    Chitchat,
}

pub struct ConversationalFilter {
    greetings: KeywordSet,
    acknowledgments: KeywordSet,
    chitchat: KeywordSet,
    replies: CannedReplies,
}

impl ConversationalFilter {
    pub fn new(domain: &DomainConfig) -> Self {
        let vocabulary = &domain.conversational;
        Self {
            greetings: KeywordSet::new(&vocabulary.greetings),
            acknowledgments: KeywordSet::new(&vocabulary.acknowledgments),
            chitchat: KeywordSet::new(&vocabulary.chitchat),
            replies: domain.replies.clone(),
        }
    }

    pub fn detect(&self, message: &str) -> Option<ConversationalKind> {
        let normalized = normalize(message);
        if normalized.is_empty() {
            return None;
        }

        if let Some(rest) = self.greetings.strip_prefix(&normalized) {
            if self.is_small_talk(&rest) {
                return Some(ConversationalKind::Greeting);
            }
        }

        if self.is_acknowledgment(&normalized) {
            return Some(ConversationalKind::Acknowledgment);
        }

        if self.is_chitchat(&normalized) {
            return Some(ConversationalKind::Chitchat);
        }

        None
    }

    pub fn reply(&self, kind: ConversationalKind) -> &str {
        match kind {
            ConversationalKind::Greeting => &self.replies.greeting,
            ConversationalKind::Acknowledgment => &self.replies.acknowledgment,
            ConversationalKind::Chitchat => &self.replies.chitchat,
        }
    }

    fn is_acknowledgment(&self, normalized: &str) -> bool {
        self.acknowledgments.equals(normalized) || self.acknowledgments.covers_all(normalized)
    }

    fn is_chitchat(&self, normalized: &str) -> bool {
        tokenize(normalized).len() <= CHITCHAT_MAX_TOKENS && self.chitchat.matches(normalized)
    }

    /// What may follow a greeting without turning it into a question
    fn is_small_talk(&self, rest: &str) -> bool {
        rest.is_empty()
            || self.greetings.equals(rest)
            || self.is_acknowledgment(rest)
            || self.is_chitchat(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ConversationalFilter {
        ConversationalFilter::new(&DomainConfig::default())
    }

    #[test]
    fn test_greetings() {
        let f = filter();
        assert_eq!(f.detect("¡Hola!"), Some(ConversationalKind::Greeting));
        assert_eq!(f.detect("Buenas tardes"), Some(ConversationalKind::Greeting));
        assert_eq!(f.detect("hola, ¿qué tal?"), Some(ConversationalKind::Greeting));
        assert_eq!(f.detect("hola buenas"), Some(ConversationalKind::Greeting));
    }

    #[test]
    fn test_greeting_with_question_passes_through() {
        let f = filter();
        assert_eq!(f.detect("Hola, ¿a qué hora abre Cáritas?"), None);
        assert_eq!(f.detect("holanda"), None);
    }

    #[test]
    fn test_acknowledgments() {
        let f = filter();
        assert_eq!(f.detect("Gracias."), Some(ConversationalKind::Acknowledgment));
        assert_eq!(f.detect("muchas gracias!"), Some(ConversationalKind::Acknowledgment));
        assert_eq!(f.detect("vale, perfecto"), Some(ConversationalKind::Acknowledgment));
        assert_eq!(f.detect("gracias por lo de Eloos"), None);
    }

    #[test]
    fn test_chitchat() {
        let f = filter();
        assert_eq!(f.detect("¿Cómo estás?"), Some(ConversationalKind::Chitchat));
        assert_eq!(f.detect("todo bien por ahí"), Some(ConversationalKind::Chitchat));
        assert_eq!(f.detect("¿qué tal el grupo de jóvenes Eloos?"), None);
    }

    #[test]
    fn test_questions_need_pipeline() {
        let f = filter();
        assert_eq!(f.detect("¿Qué es Eloos?"), None);
        assert_eq!(f.detect("   "), None);
    }

    #[test]
    fn test_replies() {
        let f = filter();
        assert!(f.reply(ConversationalKind::Greeting).starts_with("¡Hola!"));
        assert!(f.reply(ConversationalKind::Acknowledgment).contains("De nada"));
    }
}
