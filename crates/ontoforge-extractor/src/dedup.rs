//! Entity deduplication
//!
//! Suggests merges between entities of the same type whose names (and, when
//! available, embeddings) are similar. Entities are bucketed by type and an
//! inverted index of name trigrams, so only pairs sharing a type and at least
//! one trigram are compared.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use ontoforge_core::{DeduplicationRangeError, Entity, Ontology, Relationship};
use serde::{Deserialize, Serialize};

/// Weight of the semantic component in the merge score
pub const SEMANTIC_WEIGHT: f64 = 0.5;

/// Weight of the name component in the merge score
pub const NAME_WEIGHT: f64 = 0.5;

/// Why two entities were suggested for merging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeEvidence {
    pub semantic_similarity: f64,
    pub name_similarity: f64,
    pub type_match: bool,
    pub confidence1: f64,
    pub confidence2: f64,
}

/// A proposed merge of `entity2_id` into `entity1_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSuggestion {
    pub entity1_id: String,
    pub entity2_id: String,
    pub similarity_score: f64,
    pub evidence: MergeEvidence,
}

// ============================================================================
// Similarity
// ============================================================================

/// Lower-case, strip punctuation and collapse whitespace
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Padded character trigrams of a normalized name
pub fn trigrams(normalized: &str) -> HashSet<String> {
    if normalized.is_empty() {
        return HashSet::new();
    }
    let padded: Vec<char> = format!("  {} ", normalized).chars().collect();
    padded.windows(3).map(|w| w.iter().collect()).collect()
}

fn jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = (a.len() + b.len()) as f64 - intersection;
    intersection / union
}

/// Cosine similarity of two embeddings, 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut mag_a, mut mag_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f64::EPSILON {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}

struct Profile {
    normalized: String,
    trigrams: HashSet<String>,
    tokens: HashSet<String>,
    embedding: Option<Vec<f32>>,
}

// ============================================================================
// Suggestions
// ============================================================================

/// Suggest entity merges scoring at least `threshold`
///
/// The threshold is checked before any comparison. Suggestions are ordered by
/// score, highest first, ties in entity order.
pub fn suggest_merges(
    ontology: &Ontology,
    threshold: f64,
    max_suggestions: Option<usize>,
    embedding_fn: Option<&dyn Fn(&str) -> Vec<f32>>,
) -> Result<Vec<MergeSuggestion>, DeduplicationRangeError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(DeduplicationRangeError { threshold });
    }

    let entities = &ontology.entities;
    if entities.len() < 2 {
        return Ok(Vec::new());
    }

    let profiles: Vec<Profile> = entities
        .iter()
        .map(|e| {
            let normalized = normalize_name(&e.text);
            Profile {
                trigrams: trigrams(&normalized),
                tokens: normalized.split(' ').filter(|t| !t.is_empty()).map(String::from).collect(),
                embedding: embedding_fn.map(|f| f(&e.text)),
                normalized,
            }
        })
        .collect();

    let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, entity) in entities.iter().enumerate() {
        buckets
            .entry(entity.entity_type.trim().to_lowercase())
            .or_default()
            .push(i);
    }

    let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
    for members in buckets.values() {
        if embedding_fn.is_some() {
            for (a, &i) in members.iter().enumerate() {
                for &j in &members[a + 1..] {
                    pairs.insert((i, j));
                }
            }
            continue;
        }

        let mut postings: HashMap<&str, Vec<usize>> = HashMap::new();
        for &i in members {
            for gram in &profiles[i].trigrams {
                postings.entry(gram.as_str()).or_default().push(i);
            }
        }
        for posting in postings.values() {
            for (a, &i) in posting.iter().enumerate() {
                for &j in &posting[a + 1..] {
                    pairs.insert((i.min(j), i.max(j)));
                }
            }
        }
    }

    let mut seen_ids: HashSet<(&str, &str)> = HashSet::new();
    let mut suggestions: Vec<(usize, usize, MergeSuggestion)> = Vec::new();

    for (i, j) in pairs {
        let (a, b) = (&entities[i], &entities[j]);
        if a.id == b.id {
            continue;
        }
        let key = if a.id < b.id {
            (a.id.as_str(), b.id.as_str())
        } else {
            (b.id.as_str(), a.id.as_str())
        };
        if !seen_ids.insert(key) {
            continue;
        }

        let (pa, pb) = (&profiles[i], &profiles[j]);
        let name_similarity = if pa.normalized == pb.normalized && !pa.normalized.is_empty() {
            1.0
        } else {
            jaccard(&pa.trigrams, &pb.trigrams)
        };
        let semantic_similarity = match (&pa.embedding, &pb.embedding) {
            (Some(ea), Some(eb)) => cosine_similarity(ea, eb).max(0.0),
            _ => jaccard(&pa.tokens, &pb.tokens),
        };

        let score = SEMANTIC_WEIGHT * semantic_similarity + NAME_WEIGHT * name_similarity;
        if score <= 0.0 || score < threshold {
            continue;
        }

        suggestions.push((
            i,
            j,
            MergeSuggestion {
                entity1_id: a.id.clone(),
                entity2_id: b.id.clone(),
                similarity_score: score,
                evidence: MergeEvidence {
                    semantic_similarity,
                    name_similarity,
                    type_match: true,
                    confidence1: a.confidence,
                    confidence2: b.confidence,
                },
            },
        ));
    }

    suggestions.sort_by(|x, y| {
        y.2.similarity_score
            .total_cmp(&x.2.similarity_score)
            .then((x.0, x.1).cmp(&(y.0, y.1)))
    });

    let mut result: Vec<MergeSuggestion> = suggestions.into_iter().map(|(_, _, s)| s).collect();
    if let Some(limit) = max_suggestions {
        result.truncate(limit);
    }

    tracing::debug!(suggestions = result.len(), threshold, "deduplication finished");
    Ok(result)
}

// ============================================================================
// Merging
// ============================================================================

/// Apply merge suggestions, returning a new ontology
///
/// `entity2` is folded into `entity1`: the higher confidence is kept,
/// properties are unioned and relationships are rewired. Self loops and
/// duplicate triples created by the rewiring are dropped.
pub fn apply_merges(ontology: &Ontology, suggestions: &[MergeSuggestion]) -> Ontology {
    let known: HashSet<&str> = ontology.entities.iter().map(|e| e.id.as_str()).collect();
    let mut parent: HashMap<String, String> = HashMap::new();

    fn root(parent: &HashMap<String, String>, id: &str) -> String {
        let mut current = id.to_string();
        while let Some(next) = parent.get(&current) {
            current = next.clone();
        }
        current
    }

    for suggestion in suggestions {
        if !known.contains(suggestion.entity1_id.as_str())
            || !known.contains(suggestion.entity2_id.as_str())
        {
            continue;
        }
        let keep = root(&parent, &suggestion.entity1_id);
        let drop = root(&parent, &suggestion.entity2_id);
        if keep != drop {
            parent.insert(drop, keep);
        }
    }

    if parent.is_empty() {
        return ontology.clone();
    }

    let mut kept: Vec<Entity> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    for entity in &ontology.entities {
        if !parent.contains_key(&entity.id) {
            position.insert(entity.id.clone(), kept.len());
            kept.push(entity.clone());
        }
    }
    for entity in &ontology.entities {
        if !parent.contains_key(&entity.id) {
            continue;
        }
        let target = root(&parent, &entity.id);
        let Some(&index) = position.get(&target) else {
            continue;
        };
        let survivor = &mut kept[index];
        survivor.confidence = survivor.confidence.max(entity.confidence);
        for (key, value) in &entity.properties {
            survivor
                .properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        let merged_from = survivor
            .properties
            .entry("merged_from".to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let serde_json::Value::Array(ids) = merged_from {
            ids.push(serde_json::Value::String(entity.id.clone()));
        }
    }

    let mut relationships: Vec<Relationship> = Vec::new();
    let mut triples: HashMap<(String, String, String), usize> = HashMap::new();
    for rel in &ontology.relationships {
        let source_id = root(&parent, &rel.source_id);
        let target_id = root(&parent, &rel.target_id);
        if source_id == target_id {
            continue;
        }
        let key = (
            source_id.clone(),
            target_id.clone(),
            rel.relationship_type.clone(),
        );
        match triples.get(&key) {
            Some(&i) => {
                relationships[i].confidence = relationships[i].confidence.max(rel.confidence);
            }
            None => {
                triples.insert(key, relationships.len());
                relationships.push(Relationship {
                    source_id,
                    target_id,
                    ..rel.clone()
                });
            }
        }
    }

    let mut merged = Ontology {
        entities: kept,
        relationships,
        metadata: ontology.metadata.clone(),
        domain: ontology.domain.clone(),
    };
    merged.set_metadata("merged_entities", parent.len());
    merged
}
