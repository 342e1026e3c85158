//! Three-layer validation cache
//!
//! - `tdfol`: single formula -> outcome
//! - `consistency`: formula set (order-independent) -> outcome
//! - `incremental`: base set plus added and removed formulas -> outcome

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use ontoforge_core::CacheConfig;
use serde::{Deserialize, Serialize};

use crate::lru::{CacheStats, LruCache};

/// Result of validating a formula or a formula set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub consistent: bool,
    /// Human-readable findings, empty when consistent
    pub issues: Vec<String>,
}

impl ValidationOutcome {
    pub fn consistent() -> Self {
        Self {
            consistent: true,
            issues: Vec::new(),
        }
    }

    pub fn inconsistent(issues: Vec<String>) -> Self {
        Self {
            consistent: issues.is_empty(),
            issues,
        }
    }
}

/// Statistics for all three layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCacheStats {
    pub tdfol_cache: CacheStats,
    pub consistency_cache: CacheStats,
    pub incremental_cache: CacheStats,
    /// Aggregated hits over aggregated requests, four decimals
    pub total_hit_rate: f64,
}

/// Validation cache with one bounded LRU layer per kind of check
#[derive(Debug)]
pub struct ValidationCache {
    tdfol: LruCache<ValidationOutcome>,
    consistency: LruCache<ValidationOutcome>,
    incremental: LruCache<ValidationOutcome>,
}

impl ValidationCache {
    /// Create a cache with default limits
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    /// Create a cache whose layers each use the given limits
    pub fn with_config(config: &CacheConfig) -> Self {
        Self {
            tdfol: LruCache::with_config(config),
            consistency: LruCache::with_config(config),
            incremental: LruCache::with_config(config),
        }
    }

    // ========================================================================
    // Formula layer
    // ========================================================================

    pub fn get_formula(&mut self, formula: &str) -> Option<ValidationOutcome> {
        self.tdfol.get(&formula_key(formula))
    }

    pub fn set_formula(&mut self, formula: &str, outcome: ValidationOutcome) -> bool {
        self.tdfol.set(formula_key(formula), outcome)
    }

    // ========================================================================
    // Consistency layer
    // ========================================================================

    pub fn get_consistency<S: AsRef<str>>(&mut self, formulas: &[S]) -> Option<ValidationOutcome> {
        self.consistency.get(&set_key(formulas))
    }

    pub fn set_consistency<S: AsRef<str>>(
        &mut self,
        formulas: &[S],
        outcome: ValidationOutcome,
    ) -> bool {
        self.consistency.set(set_key(formulas), outcome)
    }

    // ========================================================================
    // Incremental layer
    // ========================================================================

    pub fn get_incremental<S: AsRef<str>>(
        &mut self,
        base: &[S],
        added: &[S],
        removed: &[S],
    ) -> Option<ValidationOutcome> {
        self.incremental.get(&incremental_key(base, added, removed))
    }

    pub fn set_incremental<S: AsRef<str>>(
        &mut self,
        base: &[S],
        added: &[S],
        removed: &[S],
        outcome: ValidationOutcome,
    ) -> bool {
        self.incremental
            .set(incremental_key(base, added, removed), outcome)
    }

    /// Drop every entry in all layers
    pub fn clear(&mut self) {
        self.tdfol.clear();
        self.consistency.clear();
        self.incremental.clear();
    }

    /// Statistics for every layer plus the aggregated hit rate
    pub fn stats(&self) -> ValidationCacheStats {
        let tdfol_cache = self.tdfol.stats();
        let consistency_cache = self.consistency.stats();
        let incremental_cache = self.incremental.stats();

        let hits = tdfol_cache.hits + consistency_cache.hits + incremental_cache.hits;
        let requests = tdfol_cache.total_requests
            + consistency_cache.total_requests
            + incremental_cache.total_requests;
        let total_hit_rate = if requests == 0 {
            0.0
        } else {
            round4(hits as f64 / requests as f64)
        };

        ValidationCacheStats {
            tdfol_cache,
            consistency_cache,
            incremental_cache,
            total_hit_rate,
        }
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Keys
// ============================================================================

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn formula_key(formula: &str) -> String {
    format!("f:{:016x}", hash_text(formula))
}

fn set_key<S: AsRef<str>>(formulas: &[S]) -> String {
    format!("s:{:016x}", hash_set(formulas))
}

fn incremental_key<S: AsRef<str>>(base: &[S], added: &[S], removed: &[S]) -> String {
    format!(
        "i:{:016x}:{:016x}:{:016x}",
        hash_set(base),
        hash_set(added),
        hash_set(removed)
    )
}

/// Hash text to a 64-bit value for cache keys
fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Order-independent hash of a set of formulas
fn hash_set<S: AsRef<str>>(formulas: &[S]) -> u64 {
    let sorted: BTreeSet<&str> = formulas.iter().map(|f| f.as_ref()).collect();
    let mut hasher = DefaultHasher::new();
    sorted.len().hash(&mut hasher);
    for formula in sorted {
        formula.hash(&mut hasher);
    }
    hasher.finish()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_layer() {
        let mut cache = ValidationCache::new();
        assert!(cache.get_formula("P(a)").is_none());

        cache.set_formula("P(a)", ValidationOutcome::consistent());
        assert_eq!(cache.get_formula("P(a)"), Some(ValidationOutcome::consistent()));

        let stats = cache.stats();
        assert_eq!(stats.tdfol_cache.hits, 1);
        assert_eq!(stats.tdfol_cache.misses, 1);
        assert_eq!(stats.total_hit_rate, 0.5);
    }

    #[test]
    fn test_consistency_key_ignores_order() {
        let mut cache = ValidationCache::new();
        let outcome = ValidationOutcome::inconsistent(vec!["conflict".to_string()]);
        cache.set_consistency(&["A", "B", "C"], outcome.clone());

        assert_eq!(cache.get_consistency(&["C", "A", "B"]), Some(outcome));
        assert!(cache.get_consistency(&["A", "B"]).is_none());
    }

    #[test]
    fn test_incremental_layer_distinguishes_diffs() {
        let mut cache = ValidationCache::new();
        let base = ["A", "B"];
        cache.set_incremental(&base, &["C"], &[], ValidationOutcome::consistent());

        assert!(cache.get_incremental(&base, &["C"], &[]).is_some());
        assert!(cache.get_incremental(&base, &[], &["C"]).is_none());
        assert!(cache.get_incremental(&["B", "A"], &["C"], &[]).is_some());
    }

    #[test]
    fn test_layers_are_independent() {
        let mut cache = ValidationCache::new();
        cache.set_formula("A", ValidationOutcome::consistent());

        assert!(cache.get_consistency(&["A"]).is_none());
        let stats = cache.stats();
        assert_eq!(stats.tdfol_cache.writes, 1);
        assert_eq!(stats.consistency_cache.misses, 1);
        assert_eq!(stats.incremental_cache.total_requests, 0);
    }

    #[test]
    fn test_total_hit_rate_rounding() {
        let mut cache = ValidationCache::new();
        cache.set_formula("A", ValidationOutcome::consistent());
        cache.get_formula("A");
        cache.get_formula("B");
        cache.get_consistency(&["A"]);

        assert_eq!(cache.stats().total_hit_rate, 0.3333);
    }

    #[test]
    fn test_total_hit_rate_without_requests() {
        assert_eq!(ValidationCache::new().stats().total_hit_rate, 0.0);
    }

    #[test]
    fn test_stats_serialise_nested() {
        let cache = ValidationCache::new();
        let value = serde_json::to_value(cache.stats()).unwrap();
        for key in ["tdfol_cache", "consistency_cache", "incremental_cache", "total_hit_rate"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert!(value["tdfol_cache"].get("evictions").is_some());
    }
}
