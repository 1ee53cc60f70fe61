//! Quick-action buttons for sign-up questions
//!
//! Only shown when the user explicitly asks how to join or register. The
//! topic is detected over the question and the answer together; the first
//! matching topic picks the second button.

use serde::Serialize;

use parish_chat_config::{DomainConfig, QuickActionButton, QuickActionVocabulary, TopicCategory};
use parish_chat_text_processing::{normalize, KeywordSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickActions {
    pub buttons: Vec<QuickActionButton>,
}

pub struct QuickActionDetector {
    inscription: KeywordSet,
    topics: Vec<(TopicCategory, KeywordSet)>,
    vocabulary: QuickActionVocabulary,
}

impl QuickActionDetector {
    pub fn new(domain: &DomainConfig) -> Self {
        let vocabulary = domain.quick_actions.clone();
        Self {
            inscription: KeywordSet::new(&vocabulary.inscription_keywords),
            topics: vocabulary
                .topics
                .iter()
                .map(|t| (t.category, KeywordSet::new(&t.keywords)))
                .collect(),
            vocabulary,
        }
    }

    /// Keywords are stems ("inscrib", "registr"), so they match inside words
    pub fn asks_about_inscription(&self, message: &str) -> bool {
        self.inscription.matches_stem(&normalize(message))
    }

    pub fn detect(&self, message: &str, answer: &str) -> Option<QuickActions> {
        if !self.asks_about_inscription(message) {
            return None;
        }

        let combined = normalize(&format!("{} {}", message, answer));
        let category = self
            .topics
            .iter()
            .find(|(_, keywords)| keywords.matches(&combined))
            .map(|(category, _)| *category)?;

        tracing::debug!(?category, "Quick actions matched");
        Some(QuickActions {
            buttons: vec![
                self.vocabulary.fixed_button.clone(),
                self.vocabulary.button_for(category).clone(),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parish_chat_config::QuickActionKind;

    fn detector() -> QuickActionDetector {
        QuickActionDetector::new(&DomainConfig::default())
    }

    #[test]
    fn test_group_signup() {
        let actions = detector()
            .detect("¿Cómo me inscribo en Eloos?", "Puedes apuntarte con el formulario.")
            .unwrap();
        assert_eq!(actions.buttons.len(), 2);
        assert_eq!(actions.buttons[0].label, "Ver más información");
        assert_eq!(actions.buttons[1].kind, QuickActionKind::Url);
    }

    #[test]
    fn test_topic_found_in_answer() {
        let actions = detector()
            .detect("quiero apuntarme", "Para el bautismo necesitas la partida de nacimiento.")
            .unwrap();
        assert_eq!(actions.buttons[1].label, "Ver requisitos");
    }

    #[test]
    fn test_requires_signup_intent() {
        assert!(detector().detect("¿Qué es Eloos?", "Eloos es un grupo de jóvenes.").is_none());
    }

    #[test]
    fn test_no_topic_no_buttons() {
        assert!(detector().detect("quiero inscribirme", "Claro, dime en qué.").is_none());
    }
}
