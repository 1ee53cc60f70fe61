//! Semantic response cache
//!
//! Answers are keyed by the normalized question and found again by exact key
//! or token-overlap similarity. Calendar-sensitive questions and bare
//! acknowledgements are never cached; everything else gets a TTL chosen from
//! its topic (see [`CachePolicy`]).
//!
//! ```ignore
//! let cache = SemanticCache::new(Some(store), CachePolicy::new(&domain, &config), config);
//! cache.store("¿Qué es Eloos?", "Grupo de jóvenes...").await;
//! assert!(cache.lookup("que es eloos").await.is_some());
//! ```

pub mod policy;
pub mod semantic;

pub use policy::{CachePolicy, Exclusion, TtlClass};
pub use semantic::{
    CacheEntry, CacheEntrySummary, CacheHit, CacheStats, HitKind, SemanticCache, StoreOutcome,
};
