//! Centralized constants for the parish chat backend
//!
//! Single source of truth for defaults used by settings, the cache, the
//! resilience layer and retrieval.

/// Semantic response cache
pub mod cache {
    /// Minimum similarity for a fuzzy hit
    pub const SIMILARITY_THRESHOLD: f32 = 0.75;

    /// Default entry lifetime (1 hour)
    pub const DEFAULT_TTL_SECS: u64 = 60 * 60;

    /// Identity/contact/location questions (24 hours)
    pub const STABLE_TTL_SECS: u64 = 60 * 60 * 24;

    /// Named parish group questions (7 days)
    pub const GROUP_TTL_SECS: u64 = 60 * 60 * 24 * 7;

    /// Index cleanup period (10 minutes)
    pub const CLEANUP_INTERVAL_SECS: u64 = 600;

    pub const KEY_PREFIX: &str = "semantic_cache:";
    pub const INDEX_KEY: &str = "semantic_cache:index";

    /// Utterances this short and made only of generic words are never cached
    pub const GENERIC_MAX_TOKENS: usize = 3;
}

/// Sliding-window rate limiting
pub mod rate_limit {
    pub const MAX_REQUESTS: u32 = 10;
    pub const WINDOW_MS: u64 = 60_000;
    pub const KEY_PREFIX: &str = "rate_limit:";
}

/// Circuit breaker
pub mod breaker {
    pub const FAILURE_THRESHOLD: u32 = 5;
    pub const TIMEOUT_MS: u64 = 60_000;
    pub const HALF_OPEN_MAX_PROBES: u32 = 3;
    pub const KEY_PREFIX: &str = "circuit_breaker:";

    /// Service name used for the LLM/embedding provider
    pub const LLM_SERVICE: &str = "llm_provider";
}

/// Retrieval fusion
pub mod rag {
    /// Results requested per query variant
    pub const TOP_K: usize = 5;

    /// RRF constant
    pub const RRF_K: f32 = 60.0;

    /// Minimum original similarity for a fused candidate to be used
    pub const RELEVANCE_FLOOR: f32 = 0.35;

    /// Queries shorter than this (in characters) are expanded
    pub const EXPANSION_THRESHOLD_CHARS: usize = 30;

    /// Paraphrases requested from the model
    pub const MAX_QUERY_VARIANTS: usize = 3;

    /// Fused passages handed to generation
    pub const FINAL_TOP_K: usize = 3;

    /// Passage truncation length (characters)
    pub const MAX_PASSAGE_CHARS: usize = 1000;

    pub const COLLECTION: &str = "parroquias";

    /// text-embedding-3-large
    pub const EMBEDDING_DIM: usize = 3072;
}

/// Conversation handling
pub mod chat {
    /// Turns forwarded to generation
    pub const HISTORY_WINDOW: usize = 10;

    /// Turns forwarded to follow-up rewriting
    pub const REWRITE_HISTORY_WINDOW: usize = 6;

    /// Messages at least this long are treated as self-contained
    pub const REWRITE_MAX_CHARS: usize = 30;

    /// Below this length a message opening with a connector ("y ...") is a follow-up
    pub const FOLLOW_UP_STARTER_MAX_CHARS: usize = 20;

    /// Below this length a message without a question word is a follow-up
    pub const FOLLOW_UP_BARE_MAX_CHARS: usize = 15;

    /// Chit-chat phrases only count in messages up to this many tokens
    pub const CHITCHAT_MAX_TOKENS: usize = 4;

    /// Attachments offered per reply
    pub const MAX_ATTACHMENTS: usize = 3;
}

/// External service endpoints
pub mod endpoints {
    pub const REDIS_DEFAULT: &str = "redis://127.0.0.1:6379";
    pub const QDRANT_DEFAULT: &str = "http://localhost:6334";
    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";
    pub const ANTHROPIC_DEFAULT: &str = "https://api.anthropic.com";
}

/// Model identifiers
pub mod models {
    pub const CHAT_DEFAULT: &str = "gpt-4o-mini";
    pub const EMBEDDING_DEFAULT: &str = "text-embedding-3-large";
    pub const AUXILIARY_DEFAULT: &str = "claude-3-5-haiku-20241022";
}

/// Timeouts (milliseconds)
pub mod timeouts {
    pub const STORE_CONNECT_MS: u64 = 3_000;
    pub const STORE_COMMAND_MS: u64 = 1_000;
    pub const RETRIEVAL_BRANCH_MS: u64 = 8_000;
    pub const EXPANSION_MS: u64 = 5_000;
    pub const REWRITE_MS: u64 = 5_000;
    pub const GENERATION_MS: u64 = 30_000;
    pub const HTTP_REQUEST_SECS: u64 = 60;
    pub const HEALTH_CHECK_MS: u64 = 2_000;
}
