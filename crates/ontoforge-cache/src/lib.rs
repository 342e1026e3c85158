//! OntoForge Cache - Bounded caches for ontology validation
//!
//! Provides:
//! - A bounded LRU cache with entry-count and memory ceilings, optional TTL
//!   and hit/miss/eviction accounting
//! - A three-layer validation cache (formula, consistency, incremental)
//!   whose statistics are exported as one nested object

pub mod lru;
pub mod validation;

pub use lru::{CacheStats, LruCache};
pub use validation::{ValidationCache, ValidationCacheStats, ValidationOutcome};
