//! Resource catalogue
//!
//! Forms and documents offered as attachments. Each keyword found in the
//! query scores 2, each query word overlapping a keyword scores 1, and the
//! total is divided by the resource's keyword count.

use serde::Serialize;

use parish_chat_config::constants::chat::MAX_ATTACHMENTS;
use parish_chat_config::{DomainConfig, ResourceEntry, ResourceKind};
use parish_chat_text_processing::{normalize, tokenize};

/// Words this short overlap with almost any keyword
const MIN_WORD_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
}

impl From<&ResourceEntry> for Attachment {
    fn from(entry: &ResourceEntry) -> Self {
        Self {
            id: entry.id.clone(),
            title: entry.title.clone(),
            description: entry.description.clone(),
            url: entry.url.clone(),
            kind: entry.kind,
        }
    }
}

pub struct ResourceCatalog {
    /// Entries with their normalized keywords
    entries: Vec<(ResourceEntry, Vec<String>)>,
}

impl ResourceCatalog {
    pub fn new(domain: &DomainConfig) -> Self {
        let entries = domain
            .resources
            .iter()
            .map(|entry| {
                let keywords = entry
                    .keywords
                    .iter()
                    .map(|k| normalize(k))
                    .filter(|k| !k.is_empty())
                    .collect();
                (entry.clone(), keywords)
            })
            .collect();
        Self { entries }
    }

    /// Up to three resources, most relevant first
    pub fn search(&self, query: &str) -> Vec<Attachment> {
        let query = normalize(query);
        let words: Vec<&str> = tokenize(&query)
            .into_iter()
            .filter(|w| w.chars().count() >= MIN_WORD_CHARS)
            .collect();

        let mut scored: Vec<(f32, &ResourceEntry)> = self
            .entries
            .iter()
            .filter_map(|(entry, keywords)| {
                let score = relevance(&query, &words, keywords);
                (score > 0.0).then_some((score, entry))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(MAX_ATTACHMENTS)
            .map(|(_, entry)| Attachment::from(entry))
            .collect()
    }
}

fn relevance(query: &str, words: &[&str], keywords: &[String]) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }

    let mut matches = 0usize;
    for keyword in keywords {
        if query.contains(keyword.as_str()) {
            matches += 2;
        }
        matches += words
            .iter()
            .filter(|w| keyword.contains(*w) || w.contains(keyword.as_str()))
            .count();
    }
    matches as f32 / keywords.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ResourceCatalog {
        ResourceCatalog::new(&DomainConfig::default())
    }

    #[test]
    fn test_signup_form() {
        let results = catalog().search("Quiero apuntarme al grupo de jóvenes, ¿hay formulario de inscripción?");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "comunidad_eloos");
        assert_eq!(results[0].kind, ResourceKind::Url);
    }

    #[test]
    fn test_ranked_by_relevance() {
        let results = catalog().search("formulario de inscripción de la comunidad eloos");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "comunidad_eloos");
    }

    #[test]
    fn test_pdf_request() {
        let results = catalog().search("descargar el pdf");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "comunidad_eloos_pdf");
    }

    #[test]
    fn test_unrelated_query() {
        assert!(catalog().search("horario de confesiones").is_empty());
        assert!(catalog().search("").is_empty());
    }

    #[test]
    fn test_attachment_serialization() {
        let results = catalog().search("formulario eloos");
        let json = serde_json::to_value(&results[0]).unwrap();
        assert_eq!(json["type"], "url");
        assert!(json.get("keywords").is_none());
    }
}
