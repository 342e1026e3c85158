//! Named Entity Recognition (NER) module
//!
//! Rule-based scanning over compiled pattern catalogs, overlap resolution and
//! collapsing of repeated mentions into entities.

use std::collections::HashMap;

use ontoforge_core::Entity;

use crate::patterns::{CompiledPattern, COMMON_CAPITALIZED};
use crate::resolver::ResolvedConfig;

/// Share of control characters above which text is treated as binary garbage
const GARBAGE_RATIO: f64 = 0.3;

// ============================================================================
// Candidates
// ============================================================================

/// A single pattern match before overlap resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Byte offsets into the source text
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub entity_type: String,
    pub confidence: f64,
    /// Position of the producing pattern in scan order
    pub rank: usize,
}

impl Candidate {
    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Whether text carries nothing to extract (empty, whitespace or binary noise)
pub fn is_malformed(text: &str) -> bool {
    if text.trim().is_empty() {
        return true;
    }

    let mut total = 0usize;
    let mut garbage = 0usize;
    for c in text.chars() {
        total += 1;
        if (c.is_control() && !c.is_whitespace()) || c == char::REPLACEMENT_CHARACTER {
            garbage += 1;
        }
    }
    garbage as f64 / total as f64 > GARBAGE_RATIO
}

// ============================================================================
// Rule-based Scanner
// ============================================================================

/// Scans text with pattern sets in priority order
pub struct RuleScanner<'a> {
    sets: Vec<&'a [CompiledPattern]>,
    resolved: &'a ResolvedConfig,
    confidence_threshold: f64,
}

impl<'a> RuleScanner<'a> {
    /// Create a scanner filtering with the resolved settings
    pub fn new(resolved: &'a ResolvedConfig, confidence_threshold: f64) -> Self {
        Self {
            sets: Vec::new(),
            resolved,
            confidence_threshold,
        }
    }

    /// Append a pattern set; earlier sets win confidence ties
    pub fn with_patterns(mut self, patterns: &'a [CompiledPattern]) -> Self {
        self.sets.push(patterns);
        self
    }

    /// Collect every accepted match, unresolved
    pub fn scan(&self, text: &str) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        let patterns = self.sets.iter().flat_map(|set| set.iter());
        for (rank, pattern) in patterns.enumerate() {
            for captures in pattern.regex.captures_iter(text) {
                let Some(span) = captures.get(1).or_else(|| captures.get(0)) else {
                    continue;
                };

                let (start, end) = if pattern.trim_common_words {
                    match trim_common_words(text, span.start(), span.end()) {
                        Some(range) => range,
                        None => continue,
                    }
                } else {
                    (span.start(), span.end())
                };

                let raw = &text[start..end];
                let surface = raw.trim();
                if surface.is_empty() {
                    continue;
                }
                let start = start + (raw.len() - raw.trim_start().len());
                let end = start + surface.len();

                if !self.resolved.accepts(surface, &pattern.label) {
                    continue;
                }
                if pattern.confidence < self.confidence_threshold {
                    continue;
                }

                candidates.push(Candidate {
                    start,
                    end,
                    text: surface.to_string(),
                    entity_type: pattern.label.clone(),
                    confidence: pattern.confidence.min(self.resolved.max_confidence),
                    rank,
                });
            }
        }

        candidates
    }
}

/// Keep the first run of words in a name span that are not function words
fn trim_common_words(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let span = &text[start..end];
    let mut run: Option<(usize, usize)> = None;

    for (s, e) in word_ranges(span) {
        let word = span[s..e].trim_end_matches('.');
        if COMMON_CAPITALIZED.contains(&word) {
            if run.is_some() {
                break;
            }
        } else {
            run = Some(match run {
                Some((run_start, _)) => (run_start, e),
                None => (s, e),
            });
        }
    }

    run.map(|(s, e)| (start + s, start + e))
}

fn word_ranges(s: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut current: Option<usize> = None;
    for (i, c) in s.char_indices() {
        if c.is_whitespace() {
            if let Some(begin) = current.take() {
                ranges.push((begin, i));
            }
        } else if current.is_none() {
            current = Some(i);
        }
    }
    if let Some(begin) = current {
        ranges.push((begin, s.len()));
    }
    ranges
}

// ============================================================================
// Overlap Resolution
// ============================================================================

/// Remove overlapping candidates
///
/// The longest span wins, then the most confident, then the earliest pattern.
/// The survivors are returned in text order.
pub fn resolve_overlaps(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.char_len()
            .cmp(&a.char_len())
            .then(b.confidence.total_cmp(&a.confidence))
            .then(a.rank.cmp(&b.rank))
            .then(a.start.cmp(&b.start))
    });

    let mut result = Vec::new();
    // disjoint claimed spans, sorted by start
    let mut claimed: Vec<(usize, usize)> = Vec::new();

    for candidate in candidates {
        let at = claimed.partition_point(|&(_, end)| end <= candidate.start);
        let overlaps = claimed
            .get(at)
            .is_some_and(|&(start, _)| start < candidate.end);
        if !overlaps {
            claimed.insert(at, (candidate.start, candidate.end));
            result.push(candidate);
        }
    }

    result.sort_by_key(|c| (c.start, c.rank));
    result
}

// ============================================================================
// Mention Collapsing
// ============================================================================

/// Collapse repeated `(text, type)` mentions into entities ordered by first
/// appearance, capped at `max_entities` (0 = unlimited)
pub fn collapse_mentions(
    candidates: Vec<Candidate>,
    max_entities: usize,
    include_properties: bool,
) -> Vec<Entity> {
    struct Mention {
        text: String,
        entity_type: String,
        confidence: f64,
        first_offset: usize,
        occurrences: usize,
    }

    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut mentions: Vec<Mention> = Vec::new();

    for candidate in candidates {
        let key = (candidate.text.clone(), candidate.entity_type.clone());
        match index.get(&key) {
            Some(&i) => {
                let mention = &mut mentions[i];
                mention.occurrences += 1;
                mention.confidence = mention.confidence.max(candidate.confidence);
            }
            None => {
                index.insert(key, mentions.len());
                mentions.push(Mention {
                    text: candidate.text,
                    entity_type: candidate.entity_type,
                    confidence: candidate.confidence,
                    first_offset: candidate.start,
                    occurrences: 1,
                });
            }
        }
    }

    if max_entities > 0 {
        mentions.truncate(max_entities);
    }

    mentions
        .into_iter()
        .enumerate()
        .map(|(i, m)| {
            let entity = Entity::new(entity_id(i + 1), m.text, m.entity_type, m.confidence);
            if include_properties {
                entity
                    .with_property("first_offset", m.first_offset)
                    .with_property("occurrences", m.occurrences)
                    .with_property("source", "rule")
            } else {
                entity
            }
        })
        .collect()
}

/// Format an entity id from its 1-based position
pub fn entity_id(n: usize) -> String {
    format!("ent_{:04}", n)
}
