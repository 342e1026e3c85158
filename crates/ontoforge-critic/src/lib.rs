//! OntoForge Critic - Ontology quality scoring
//!
//! Scores an ontology on six independent dimensions relative to the domain
//! profile of its context, derives the weighted overall score, and lists
//! strengths, weaknesses and recommendations.

use std::collections::{HashMap, HashSet};

use ontoforge_core::{
    CriticScore, DomainProfile, Entity, Ontology, OntologyGenerationContext, Relationship,
};

pub mod explain;

pub use explain::{band, explain_score};

/// Dimensions at or above this value are listed as strengths
pub const STRENGTH_THRESHOLD: f64 = 0.80;

/// Dimensions below this value are listed as weaknesses with a recommendation
pub const WEAKNESS_THRESHOLD: f64 = 0.60;

/// Relationship types that must not hold in both directions between two entities
const ASYMMETRIC_TYPES: &[&str] = &[
    "manages",
    "supervises",
    "reports_to",
    "employs",
    "works_for",
    "owns",
    "acquired",
    "part_of",
    "treats",
    "prescribes",
];

/// Entity types whose labels are expected to be numeric
const NUMERIC_TYPES: &[&str] = &[
    "Date",
    "Time",
    "Duration",
    "MonetaryAmount",
    "Dosage",
    "Percentage",
    "Clause",
];

// ============================================================================
// Critic
// ============================================================================

/// Ontology critic
#[derive(Debug, Clone, Copy, Default)]
pub struct OntologyCritic;

impl OntologyCritic {
    pub fn new() -> Self {
        Self
    }

    /// Score an ontology against the domain of its context
    pub fn evaluate_ontology(
        &self,
        ontology: &Ontology,
        context: &OntologyGenerationContext,
    ) -> CriticScore {
        let profile = DomainProfile::for_domain(&context.domain);

        let mut score = CriticScore::from_dimensions(
            completeness(ontology, profile),
            consistency(ontology),
            clarity(ontology),
            granularity(ontology, profile),
            relationship_coherence(ontology, profile),
            domain_alignment(ontology, profile),
        );
        annotate(&mut score);

        tracing::info!(
            data_source = %context.data_source,
            domain = profile.name,
            overall = score.overall,
            "ontology evaluated"
        );
        tracing::debug!(dimensions = ?score.dimensions(), "dimension scores");
        score
    }
}

/// Score an ontology with the default critic
pub fn evaluate_ontology(ontology: &Ontology, context: &OntologyGenerationContext) -> CriticScore {
    OntologyCritic::new().evaluate_ontology(ontology, context)
}

// ============================================================================
// Dimensions
// ============================================================================

/// Entity coverage, type variety and relationship coverage
fn completeness(ontology: &Ontology, profile: &DomainProfile) -> f64 {
    let n = ontology.entities.len();
    if n == 0 {
        return 0.0;
    }

    let entity_coverage = ratio(n as f64, profile.expected_entities as f64);

    let distinct_types: HashSet<&str> = ontology
        .entities
        .iter()
        .map(|e| e.entity_type.as_str())
        .collect();
    let expected_types = profile.entity_types.len().clamp(1, 4);
    let type_coverage = ratio(distinct_types.len() as f64, expected_types as f64);

    let relationship_coverage = if n < 2 {
        1.0
    } else {
        ratio(
            ontology.relationships.len() as f64,
            n as f64 * profile.expected_relationship_ratio,
        )
    };

    0.5 * entity_coverage + 0.2 * type_coverage + 0.3 * relationship_coverage
}

/// One minus the share of structural issues over all elements
fn consistency(ontology: &Ontology) -> f64 {
    let elements = ontology.entities.len() + ontology.relationships.len();
    if elements == 0 {
        return 1.0;
    }
    let issues = consistency_issues(ontology).len();
    (1.0 - issues as f64 / elements as f64).clamp(0.0, 1.0)
}

/// Internal contradictions in an ontology, one message per issue
pub fn consistency_issues(ontology: &Ontology) -> Vec<String> {
    let mut issues = Vec::new();

    let mut entity_ids = HashSet::new();
    for entity in &ontology.entities {
        if !entity_ids.insert(entity.id.as_str()) {
            issues.push(format!("duplicate entity id {}", entity.id));
        }
    }

    let mut types_by_text: HashMap<String, &str> = HashMap::new();
    for entity in &ontology.entities {
        let key = entity.text.trim().to_lowercase();
        match types_by_text.get(&key) {
            Some(existing) if *existing != entity.entity_type => issues.push(format!(
                "'{}' is typed both {} and {}",
                entity.text, existing, entity.entity_type
            )),
            Some(_) => {}
            None => {
                types_by_text.insert(key, &entity.entity_type);
            }
        }
    }

    let mut relationship_ids = HashSet::new();
    let mut triples = HashSet::new();
    for rel in &ontology.relationships {
        if !relationship_ids.insert(rel.id.as_str()) {
            issues.push(format!("duplicate relationship id {}", rel.id));
        }
        if !entity_ids.contains(rel.source_id.as_str())
            || !entity_ids.contains(rel.target_id.as_str())
        {
            issues.push(format!("{} references a missing entity", rel.id));
        }
        if rel.source_id == rel.target_id {
            issues.push(format!("{} is a self loop", rel.id));
        }
        let triple = (
            rel.source_id.as_str(),
            rel.target_id.as_str(),
            rel.relationship_type.as_str(),
        );
        if !triples.insert(triple) {
            issues.push(format!("{} repeats an existing relationship", rel.id));
        }
    }

    for rel in &ontology.relationships {
        if rel.source_id < rel.target_id
            && ASYMMETRIC_TYPES.contains(&rel.relationship_type.as_str())
            && triples.contains(&(
                rel.target_id.as_str(),
                rel.source_id.as_str(),
                rel.relationship_type.as_str(),
            ))
        {
            issues.push(format!(
                "{} holds in both directions between {} and {}",
                rel.relationship_type, rel.source_id, rel.target_id
            ));
        }
    }

    issues
}

/// Mean label clarity over all entities
fn clarity(ontology: &Ontology) -> f64 {
    if ontology.entities.is_empty() {
        return 0.0;
    }

    let mut types_per_text: HashMap<String, HashSet<&str>> = HashMap::new();
    for entity in &ontology.entities {
        types_per_text
            .entry(entity.text.trim().to_lowercase())
            .or_default()
            .insert(&entity.entity_type);
    }

    let total: f64 = ontology
        .entities
        .iter()
        .map(|e| {
            let ambiguous = types_per_text
                .get(&e.text.trim().to_lowercase())
                .is_some_and(|types| types.len() > 1);
            label_clarity(e, ambiguous)
        })
        .sum();
    total / ontology.entities.len() as f64
}

fn label_clarity(entity: &Entity, ambiguous: bool) -> f64 {
    let text = entity.text.as_str();
    let mut score: f64 = 1.0;

    if text.trim().chars().count() < 3 {
        score -= 0.4;
    }
    if text != text.trim()
        || text.contains("  ")
        || text
            .chars()
            .next()
            .is_some_and(|c| !c.is_alphanumeric() && c != '$' && c != '€' && c != '£')
    {
        score -= 0.3;
    }
    if !text.chars().any(char::is_alphabetic)
        && !NUMERIC_TYPES.contains(&entity.entity_type.as_str())
    {
        score -= 0.3;
    }
    if !is_pascal_case(&entity.entity_type) {
        score -= 0.2;
    }
    if ambiguous {
        score -= 0.3;
    }
    score.clamp(0.0, 1.0)
}

fn is_pascal_case(label: &str) -> bool {
    label.chars().next().is_some_and(char::is_uppercase)
        && label.chars().all(char::is_alphanumeric)
}

/// Entity volume against the expected vocabulary and relationship density
fn granularity(ontology: &Ontology, profile: &DomainProfile) -> f64 {
    let n = ontology.entities.len();
    if n == 0 {
        return 0.0;
    }

    let volume = n as f64 / profile.expected_entities.max(1) as f64;
    let volume_fit = (1.0 - volume.ln().abs() / 4f64.ln()).max(0.0);

    let expected = profile.expected_relationship_ratio;
    let per_entity = ontology.relationships.len() as f64 / n as f64;
    let density = (1.0 - (per_entity - expected).abs() / (expected + 1.0)).max(0.0);

    0.6 * volume_fit + 0.4 * density
}

/// Mean confidence-weighted plausibility of relationships
fn relationship_coherence(ontology: &Ontology, profile: &DomainProfile) -> f64 {
    if ontology.entities.len() < 2 {
        return 0.5;
    }
    if ontology.relationships.is_empty() {
        return 0.0;
    }

    let types: HashMap<&str, &str> = ontology
        .entities
        .iter()
        .map(|e| (e.id.as_str(), e.entity_type.as_str()))
        .collect();

    let total: f64 = ontology
        .relationships
        .iter()
        .map(|rel| coherence_of(rel, &types, profile))
        .sum();
    total / ontology.relationships.len() as f64
}

fn coherence_of(rel: &Relationship, types: &HashMap<&str, &str>, profile: &DomainProfile) -> f64 {
    let (Some(source), Some(target)) = (
        types.get(rel.source_id.as_str()),
        types.get(rel.target_id.as_str()),
    ) else {
        return 0.0;
    };
    let plausibility = profile.relationship_plausibility(&rel.relationship_type, source, target);
    plausibility * (0.5 + 0.5 * rel.confidence.clamp(0.0, 1.0))
}

/// Share of entity and relationship types the domain expects
fn domain_alignment(ontology: &Ontology, profile: &DomainProfile) -> f64 {
    let n = ontology.entities.len();
    if n == 0 {
        return 0.0;
    }

    let entity_fraction = ontology
        .entities
        .iter()
        .filter(|e| profile.expects_entity_type(&e.entity_type))
        .count() as f64
        / n as f64;

    let relationship_fraction = if ontology.relationships.is_empty() {
        entity_fraction
    } else {
        ontology
            .relationships
            .iter()
            .filter(|r| profile.expects_relationship_type(&r.relationship_type))
            .count() as f64
            / ontology.relationships.len() as f64
    };

    0.7 * entity_fraction + 0.3 * relationship_fraction
}

fn ratio(value: f64, expected: f64) -> f64 {
    if expected <= 0.0 {
        1.0
    } else {
        (value / expected).min(1.0)
    }
}

// ============================================================================
// Feedback
// ============================================================================

fn annotate(score: &mut CriticScore) {
    for (name, value) in score.dimensions() {
        if value >= STRENGTH_THRESHOLD {
            score.strengths.push(strength_for(name).to_string());
        } else if value < WEAKNESS_THRESHOLD {
            score.weaknesses.push(weakness_for(name).to_string());
            score
                .recommendations
                .push(recommendation_for(name).to_string());
        }
    }
}

fn strength_for(dimension: &str) -> &'static str {
    match dimension {
        "completeness" => "Good coverage of entities and relationships",
        "consistency" => "No structural contradictions",
        "clarity" => "Entity labels are clear and unambiguous",
        "granularity" => "Entity volume and relationship density fit the domain",
        "relationship_coherence" => "Relationships connect plausible entity types",
        _ => "Entity and relationship types follow the domain taxonomy",
    }
}

fn weakness_for(dimension: &str) -> &'static str {
    match dimension {
        "completeness" => "Too few entities or relationships for the domain",
        "consistency" => "Contains dangling, duplicate or contradictory elements",
        "clarity" => "Some entity labels are short, noisy or ambiguous",
        "granularity" => "Entity volume or relationship density is off for the domain",
        "relationship_coherence" => "Some relationships connect implausible entity types",
        _ => "Many types fall outside the domain taxonomy",
    }
}

fn recommendation_for(dimension: &str) -> &'static str {
    match dimension {
        "completeness" => "Expand extraction coverage with domain patterns",
        "consistency" => "Remove invalid relationships and merge duplicate entities",
        "clarity" => "Normalise entity labels and drop unclear ones",
        "granularity" => "Merge near-duplicate entities or extract more detail",
        "relationship_coherence" => "Retype or prune implausible relationships",
        _ => "Align entity types with the domain taxonomy",
    }
}

// ============================================================================
// Tests
// ============================================================================
