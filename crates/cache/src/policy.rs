//! What may be cached, and for how long

use std::time::Duration;

use parish_chat_config::{CacheConfig, DomainConfig};
use parish_chat_config::constants::cache::GENERIC_MAX_TOKENS;
use parish_chat_text_processing::{tokenize, KeywordSet};

/// Why a question bypasses the cache entirely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Mentions dates, events or schedules whose answer changes over time
    CalendarSensitive,
    /// A bare acknowledgement or greeting ("gracias", "ok vale")
    GenericUtterance,
}

impl Exclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exclusion::CalendarSensitive => "calendar_sensitive",
            Exclusion::GenericUtterance => "generic_utterance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    /// Identity, contact and location questions
    Stable,
    /// Questions naming a parish group or ministry
    Group,
    Default,
}

#[derive(Debug, Clone)]
pub struct CachePolicy {
    calendar: KeywordSet,
    generic: KeywordSet,
    stable: KeywordSet,
    groups: KeywordSet,
    default_ttl: Duration,
    stable_ttl: Duration,
    group_ttl: Duration,
}

impl CachePolicy {
    pub fn new(domain: &DomainConfig, config: &CacheConfig) -> Self {
        Self {
            calendar: KeywordSet::new(&domain.calendar_keywords),
            generic: KeywordSet::new(&domain.generic_words),
            stable: KeywordSet::new(&domain.ttl.stable_phrases),
            groups: KeywordSet::new(&domain.ttl.group_names),
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            stable_ttl: Duration::from_secs(config.stable_ttl_secs),
            group_ttl: Duration::from_secs(config.group_ttl_secs),
        }
    }

    /// Exclusion applying to an already-normalized question, if any
    pub fn exclusion(&self, normalized: &str) -> Option<Exclusion> {
        if self.is_calendar_sensitive(normalized) {
            Some(Exclusion::CalendarSensitive)
        } else if self.is_generic_utterance(normalized) {
            Some(Exclusion::GenericUtterance)
        } else {
            None
        }
    }

    pub fn is_calendar_sensitive(&self, normalized: &str) -> bool {
        self.calendar.matches(normalized)
    }

    /// 1 to 3 tokens, every one of them a generic word
    pub fn is_generic_utterance(&self, normalized: &str) -> bool {
        let count = tokenize(normalized).len();
        (1..=GENERIC_MAX_TOKENS).contains(&count) && self.generic.covers_all(normalized)
    }

    pub fn ttl_class(&self, normalized: &str) -> TtlClass {
        if self.stable.matches(normalized) {
            TtlClass::Stable
        } else if self.groups.matches(normalized) {
            TtlClass::Group
        } else {
            TtlClass::Default
        }
    }

    pub fn ttl_for(&self, normalized: &str) -> Duration {
        match self.ttl_class(normalized) {
            TtlClass::Stable => self.stable_ttl,
            TtlClass::Group => self.group_ttl,
            TtlClass::Default => self.default_ttl,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(&DomainConfig::default(), &CacheConfig::default())
    }
}
