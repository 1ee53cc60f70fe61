//! Keyword families matched against normalized text
//!
//! Phrases are normalized once at construction. Matching is on whole tokens,
//! so "mes" matches "este mes" but not "mesa".

use crate::normalize::{normalize, tokenize};

#[derive(Debug, Clone, Default)]
pub struct KeywordSet {
    phrases: Vec<Vec<String>>,
}

impl KeywordSet {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut phrases: Vec<Vec<String>> = Vec::new();
        for keyword in keywords {
            let normalized = normalize(keyword.as_ref());
            let tokens: Vec<String> = tokenize(&normalized).into_iter().map(String::from).collect();
            if !tokens.is_empty() && !phrases.contains(&tokens) {
                phrases.push(tokens);
            }
        }
        Self { phrases }
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Any phrase appears as a contiguous token run in `normalized`
    pub fn matches(&self, normalized: &str) -> bool {
        let tokens = tokenize(normalized);
        self.phrases.iter().any(|p| contains_run(&tokens, p))
    }

    /// Any phrase opens `normalized`
    pub fn starts(&self, normalized: &str) -> bool {
        let tokens = tokenize(normalized);
        self.phrases.iter().any(|p| opens(&tokens, p))
    }

    /// What follows the longest phrase opening `normalized`, if one does
    pub fn strip_prefix(&self, normalized: &str) -> Option<String> {
        let tokens = tokenize(normalized);
        self.phrases
            .iter()
            .filter(|p| opens(&tokens, p))
            .map(|p| p.len())
            .max()
            .map(|n| tokens[n..].join(" "))
    }

    /// Any phrase equals the whole of `normalized`
    pub fn equals(&self, normalized: &str) -> bool {
        let tokens = tokenize(normalized);
        self.phrases
            .iter()
            .any(|p| p.len() == tokens.len() && tokens.iter().zip(p.iter()).all(|(t, k)| *t == k.as_str()))
    }

    /// Every token of `normalized` is a single-word phrase of this set
    pub fn covers_all(&self, normalized: &str) -> bool {
        let tokens = tokenize(normalized);
        !tokens.is_empty()
            && tokens
                .iter()
                .all(|t| self.phrases.iter().any(|p| p.len() == 1 && p[0] == *t))
    }

    /// Any phrase occurs as a raw substring (used for word stems such as "inscrib")
    pub fn matches_stem(&self, normalized: &str) -> bool {
        self.phrases.iter().any(|p| normalized.contains(&p.join(" ")))
    }
}

fn opens(tokens: &[&str], phrase: &[String]) -> bool {
    tokens.len() >= phrase.len() && tokens.iter().zip(phrase.iter()).all(|(t, k)| *t == k.as_str())
}

fn contains_run(tokens: &[&str], phrase: &[String]) -> bool {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(phrase.len())
        .any(|w| w.iter().zip(phrase.iter()).all(|(t, k)| *t == k.as_str()))
}
