//! Configuration resolution
//!
//! Turns a [`ConfigSource`] into the canonical settings the scanner reads on
//! every match: minimum length, lower-cased stopwords, allowed types, the
//! confidence ceiling and the compiled custom/dictionary rules.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ontoforge_core::{ConfigSource, ExtractionConfig};
use regex::escape;

use crate::patterns::CompiledPattern;

/// Number of resolved configurations kept before the oldest is evicted
pub const RESOLVER_CAPACITY: usize = 32;

/// Confidence for user-supplied pattern rules
pub const CUSTOM_RULE_CONFIDENCE: f64 = 0.8;

/// Confidence for domain dictionary terms
pub const VOCAB_CONFIDENCE: f64 = 0.95;

/// Settings resolved once per configuration
#[derive(Debug)]
pub struct ResolvedConfig {
    pub min_len: usize,
    pub stopwords: HashSet<String>,
    pub allowed_types: HashSet<String>,
    pub max_confidence: f64,
    /// Custom rules followed by dictionary terms
    pub extra_patterns: Vec<CompiledPattern>,
}

impl ResolvedConfig {
    fn from_config(config: &ExtractionConfig) -> Self {
        let max_confidence = if config.max_confidence.is_finite() {
            config.max_confidence
        } else {
            tracing::warn!(
                value = config.max_confidence,
                "max_confidence is not finite, using 1.0"
            );
            1.0
        };

        let mut extra_patterns = Vec::new();
        for rule in &config.custom_rules {
            match CompiledPattern::new(&rule.pattern, &rule.entity_type, CUSTOM_RULE_CONFIDENCE, false)
            {
                Ok(compiled) => extra_patterns.push(compiled),
                Err(e) => {
                    tracing::warn!(pattern = %rule.pattern, error = %e, "skipping invalid custom rule")
                }
            }
        }

        for (entity_type, terms) in &config.domain_vocab {
            for term in terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                let pattern = format!(r"(?i)\b{}\b", escape(term));
                match CompiledPattern::new(&pattern, entity_type, VOCAB_CONFIDENCE, false) {
                    Ok(compiled) => extra_patterns.push(compiled),
                    Err(e) => tracing::warn!(term, error = %e, "skipping vocabulary term"),
                }
            }
        }

        Self {
            min_len: config.min_entity_length,
            stopwords: config
                .stopwords
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect(),
            allowed_types: config.allowed_entity_types.iter().cloned().collect(),
            max_confidence,
            extra_patterns,
        }
    }

    /// Whether a matched span passes the length, stopword and type filters
    pub fn accepts(&self, text: &str, entity_type: &str) -> bool {
        text.chars().count() >= self.min_len
            && !self.stopwords.contains(&text.to_lowercase())
            && (self.allowed_types.is_empty() || self.allowed_types.contains(entity_type))
    }
}

struct ResolverState {
    // The stored ConfigSource keeps its Arc alive so the address key stays unique
    entries: HashMap<usize, (ConfigSource, Arc<ResolvedConfig>)>,
    order: VecDeque<usize>,
}

/// Memoizes [`ResolvedConfig`] by configuration identity in a bounded FIFO
pub struct ConfigResolver {
    state: Mutex<ResolverState>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::with_capacity(RESOLVER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ResolverState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Resolve a configuration, returning the cached result for a known identity
    pub fn resolve(&self, source: &ConfigSource) -> Arc<ResolvedConfig> {
        let key = source.identity();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some((_, resolved)) = state.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(resolved);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let resolved = Arc::new(ResolvedConfig::from_config(source.settings()));

        if state.entries.len() >= self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
                tracing::debug!(key = oldest, "evicted resolved config");
            }
        }
        state
            .entries
            .insert(key, (source.clone(), Arc::clone(&resolved)));
        state.order.push_back(key);

        resolved
    }

    /// Number of memoized configurations
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}
