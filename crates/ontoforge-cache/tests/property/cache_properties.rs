//! Property tests for cache ceilings and accounting

use proptest::prelude::*;

use ontoforge_cache::{LruCache, ValidationCache, ValidationOutcome};

#[derive(Debug, Clone)]
enum Op {
    Get(u8),
    Set(u8, usize),
    Invalidate(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..20).prop_map(Op::Get),
        (0u8..20, 0usize..200).prop_map(|(k, len)| Op::Set(k, len)),
        (0u8..20).prop_map(Op::Invalidate),
    ]
}

proptest! {
    #[test]
    fn ceilings_hold_after_every_operation(
        max_size in 1usize..8,
        max_bytes in 50usize..600,
        ops in prop::collection::vec(op(), 1..80),
    ) {
        let mut cache: LruCache<String> =
            LruCache::new(max_size, max_bytes as f64 / (1024.0 * 1024.0), None);

        for op in ops {
            match op {
                Op::Get(k) => {
                    cache.get(&format!("key{}", k));
                }
                Op::Set(k, len) => {
                    cache.set(format!("key{}", k), "x".repeat(len));
                }
                Op::Invalidate(k) => {
                    cache.invalidate(&format!("key{}", k));
                }
            }
            prop_assert!(cache.len() <= max_size);
            prop_assert!(cache.memory_bytes() <= max_bytes);
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.total_requests, stats.hits + stats.misses);
        prop_assert!((0.0..=1.0).contains(&stats.hit_rate));
    }

    #[test]
    fn distinct_sets_beyond_capacity_evict(max_size in 1usize..10, extra in 1usize..10) {
        let mut cache: LruCache<u32> = LruCache::new(max_size, 10.0, None);
        for i in 0..(max_size + extra) {
            let key = format!("k{}", i);
            prop_assert!(cache.set(key, i as u32));
        }
        prop_assert_eq!(cache.len(), max_size);
        prop_assert_eq!(cache.stats().evictions, extra as u64);
    }

    #[test]
    fn consistency_key_is_order_independent(
        mut formulas in prop::collection::vec("[A-Z][a-z]{0,4}\\([a-z]\\)", 1..8),
    ) {
        let mut cache = ValidationCache::new();
        cache.set_consistency(&formulas, ValidationOutcome::consistent());
        formulas.reverse();
        prop_assert!(cache.get_consistency(&formulas).is_some());
    }

    #[test]
    fn total_hit_rate_has_four_decimals(hits in 0usize..30, misses in 0usize..30) {
        let mut cache = ValidationCache::new();
        cache.set_formula("known", ValidationOutcome::consistent());
        for _ in 0..hits {
            cache.get_formula("known");
        }
        for i in 0..misses {
            cache.get_formula(&format!("unknown{}", i));
        }

        let rate = cache.stats().total_hit_rate;
        prop_assert!((0.0..=1.0).contains(&rate));
        prop_assert!(((rate * 10_000.0).round() - rate * 10_000.0).abs() < 1e-6);
    }
}
