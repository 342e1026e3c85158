//! Fallback extraction
//!
//! Prompt construction, response parsing and merging for the pluggable
//! [`FallbackBackend`], plus a mock backend for tests and offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};

use ontoforge_core::{
    DomainProfile, Entity, ExtractionStrategy, FallbackBackend, FallbackTrigger, Result,
};
use serde::Deserialize;

use crate::ner::entity_id;

/// Confidence given to fallback entities that do not report one
pub const DEFAULT_FALLBACK_CONFIDENCE: f64 = 0.8;

const SYSTEM_PROMPT: &str = include_str!("prompts/entity_fallback.txt");

// ============================================================================
// Mock Backend
// ============================================================================

/// Backend returning a canned response; disabled unless built with
/// [`MockFallback::enabled_with`]
#[derive(Debug)]
pub struct MockFallback {
    enabled: bool,
    response: String,
    calls: AtomicUsize,
}

impl MockFallback {
    /// Disabled mock answering `[]`
    pub fn new() -> Self {
        Self {
            enabled: false,
            response: "[]".to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Enabled mock answering `response`
    pub fn enabled_with(response: impl Into<String>) -> Self {
        Self {
            enabled: true,
            response: response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of completions served
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for MockFallback {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackBackend for MockFallback {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn complete(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.response.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Prompting
// ============================================================================

/// Whether the fallback should be consulted for this document
///
/// Mean confidence is 0 when there are no entities, so an empty result
/// consults the fallback under either trigger.
pub fn should_consult(
    strategy: ExtractionStrategy,
    backend: &dyn FallbackBackend,
    entities: &[Entity],
    threshold: f64,
    trigger: FallbackTrigger,
) -> bool {
    if !strategy.allows_fallback() || !backend.is_enabled() {
        return false;
    }
    if entities.is_empty() {
        return 0.0 < threshold;
    }
    match trigger {
        FallbackTrigger::MeanConfidence => {
            let mean =
                entities.iter().map(|e| e.confidence).sum::<f64>() / entities.len() as f64;
            mean < threshold
        }
        FallbackTrigger::AnyEntity => entities.iter().any(|e| e.confidence < threshold),
    }
}

/// Build the extraction prompt for a domain
pub fn build_prompt(domain: &str, text: &str) -> String {
    let profile = DomainProfile::for_domain(domain);
    format!(
        "{}\nEntity types to extract: {}\n\nDocument:\n{}\n\nEntities (JSON array):",
        SYSTEM_PROMPT,
        profile.entity_types.join(", "),
        text
    )
}

/// An entity proposed by the fallback and located in the text
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackEntity {
    pub text: String,
    pub entity_type: String,
    pub confidence: f64,
    pub first_offset: usize,
}

#[derive(Debug, Deserialize)]
struct RawFallbackEntity {
    text: String,
    #[serde(rename = "type", alias = "entity_type")]
    entity_type: String,
    confidence: Option<f64>,
}

/// Parse a backend response
///
/// The first JSON array in the response is read; anything unparseable yields
/// no entities. Entities whose text does not occur in `original_text` are
/// discarded.
pub fn parse_response(response: &str, original_text: &str) -> Vec<FallbackEntity> {
    let json = match (response.find('['), response.rfind(']')) {
        (Some(start), Some(end)) if start < end => &response[start..=end],
        _ => return Vec::new(),
    };
    let raw: Vec<RawFallbackEntity> = serde_json::from_str(json).unwrap_or_default();

    raw.into_iter()
        .filter_map(|e| {
            let text = e.text.trim().to_string();
            let entity_type = e.entity_type.trim().to_string();
            if text.is_empty() || entity_type.is_empty() {
                return None;
            }
            let Some(first_offset) = original_text.find(&text) else {
                tracing::debug!(text = %text, "discarding fallback entity not present in text");
                return None;
            };
            Some(FallbackEntity {
                text,
                entity_type,
                confidence: e
                    .confidence
                    .filter(|c| c.is_finite())
                    .unwrap_or(DEFAULT_FALLBACK_CONFIDENCE)
                    .clamp(0.0, 1.0),
                first_offset,
            })
        })
        .collect()
}

/// Merge fallback entities into rule output by `(text, type)`
///
/// Entities are re-ordered by first appearance and renumbered. Returns the
/// merged list and the number of entities the fallback added.
pub fn merge_entities(
    rule_entities: Vec<Entity>,
    found: Vec<FallbackEntity>,
    text: &str,
    max_entities: usize,
    include_properties: bool,
) -> (Vec<Entity>, usize) {
    let mut merged: Vec<(usize, Entity)> = rule_entities
        .into_iter()
        .map(|e| {
            let offset = e
                .properties
                .get("first_offset")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .or_else(|| text.find(&e.text))
                .unwrap_or(usize::MAX);
            (offset, e)
        })
        .collect();

    let mut added = 0;
    for candidate in found {
        let known = merged.iter().any(|(_, e)| {
            e.text == candidate.text && e.entity_type == candidate.entity_type
        });
        if known {
            continue;
        }
        let mut entity = Entity::new(
            String::new(),
            candidate.text,
            candidate.entity_type,
            candidate.confidence,
        );
        if include_properties {
            entity = entity
                .with_property("first_offset", candidate.first_offset)
                .with_property("occurrences", 1)
                .with_property("source", "fallback");
        }
        merged.push((candidate.first_offset, entity));
        added += 1;
    }

    merged.sort_by_key(|(offset, _)| *offset);
    if max_entities > 0 {
        merged.truncate(max_entities);
    }

    let entities = merged
        .into_iter()
        .enumerate()
        .map(|(i, (_, mut e))| {
            e.id = entity_id(i + 1);
            e
        })
        .collect();
    (entities, added)
}
