//! Feedback-driven refinement
//!
//! Maps a critic score to refinement actions and applies them to a copy of
//! the ontology. Each action targets one weak dimension.

use std::collections::{HashMap, HashSet};

use ontoforge_core::{
    domain::GENERIC_RELATIONSHIP, CriticScore, DomainProfile, Ontology, OntologyGenerationContext,
};
use serde::{Deserialize, Serialize};

use crate::dedup::{apply_merges, suggest_merges};
use crate::generator::OntologyGenerator;
use crate::ner::entity_id;
use crate::patterns::{BUSINESS_PATTERNS, GENERAL_PATTERNS, LEGAL_PATTERNS, MEDICAL_PATTERNS};
use crate::relation::id_number;

/// Dimensions scoring below this trigger their refinement action
pub const ACTION_THRESHOLD: f64 = 0.7;

/// Similarity at which refinement merges duplicate entities
pub const REFINE_MERGE_THRESHOLD: f64 = 0.85;

/// Off-taxonomy entities at or above this confidence survive domain alignment
pub const ALIGNMENT_KEEP_CONFIDENCE: f64 = 0.7;

/// Implausible relationships at or above this confidence are retyped instead of dropped
pub const RETYPE_CONFIDENCE: f64 = 0.7;

/// Amount the confidence threshold is lowered for coverage expansion
const RELAXATION: f64 = 0.1;

/// One refinement step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementAction {
    ExpandCoverage,
    PruneInvalidRelationships,
    MergeDuplicates,
    ClarifyLabels,
    PruneImplausibleRelationships,
    AlignWithDomain,
}

impl RefinementAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExpandCoverage => "expand_coverage",
            Self::PruneInvalidRelationships => "prune_invalid_relationships",
            Self::MergeDuplicates => "merge_duplicates",
            Self::ClarifyLabels => "clarify_labels",
            Self::PruneImplausibleRelationships => "prune_implausible_relationships",
            Self::AlignWithDomain => "align_with_domain",
        }
    }

    /// Primary action addressing one critic dimension
    pub fn for_dimension(dimension: &str) -> Option<RefinementAction> {
        match dimension {
            "completeness" => Some(Self::ExpandCoverage),
            "consistency" => Some(Self::PruneInvalidRelationships),
            "clarity" => Some(Self::ClarifyLabels),
            "granularity" => Some(Self::MergeDuplicates),
            "relationship_coherence" => Some(Self::PruneImplausibleRelationships),
            "domain_alignment" => Some(Self::AlignWithDomain),
            _ => None,
        }
    }

    /// Actions for the weak dimensions of a score, in application order
    pub fn for_score(score: &CriticScore) -> Vec<RefinementAction> {
        let mut actions = Vec::new();
        let mut push = |action: RefinementAction| {
            if !actions.contains(&action) {
                actions.push(action);
            }
        };

        if score.completeness < ACTION_THRESHOLD {
            push(Self::ExpandCoverage);
        }
        if score.consistency < ACTION_THRESHOLD {
            push(Self::PruneInvalidRelationships);
            push(Self::MergeDuplicates);
        }
        if score.granularity < ACTION_THRESHOLD {
            push(Self::MergeDuplicates);
        }
        if score.clarity < ACTION_THRESHOLD {
            push(Self::ClarifyLabels);
        }
        if score.relationship_coherence < ACTION_THRESHOLD {
            push(Self::PruneImplausibleRelationships);
        }
        if score.domain_alignment < ACTION_THRESHOLD {
            push(Self::AlignWithDomain);
        }
        actions
    }
}

impl std::fmt::Display for RefinementAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Refinement
// ============================================================================

impl OntologyGenerator {
    /// Apply the actions suggested by `feedback`, returning a new ontology
    pub fn refine_ontology(
        &self,
        ontology: &Ontology,
        feedback: &CriticScore,
        context: &OntologyGenerationContext,
        text: &str,
    ) -> Ontology {
        let actions = RefinementAction::for_score(feedback);
        let mut refined = ontology.clone();

        for action in &actions {
            match action {
                RefinementAction::ExpandCoverage => {
                    self.expand_coverage(&mut refined, context, text)
                }
                RefinementAction::PruneInvalidRelationships => {
                    prune_invalid_relationships(&mut refined)
                }
                RefinementAction::MergeDuplicates => {
                    if let Ok(suggestions) =
                        suggest_merges(&refined, REFINE_MERGE_THRESHOLD, None, None)
                    {
                        refined = apply_merges(&refined, &suggestions);
                    }
                }
                RefinementAction::ClarifyLabels => {
                    clarify_labels(&mut refined, context.settings().min_entity_length)
                }
                RefinementAction::PruneImplausibleRelationships => {
                    prune_implausible_relationships(&mut refined)
                }
                RefinementAction::AlignWithDomain => align_with_domain(&mut refined),
            }
        }

        let names: Vec<&str> = actions.iter().map(|a| a.as_str()).collect();
        tracing::debug!(actions = ?names, "refinement applied");

        refined.set_metadata("refinement_actions", names);
        refined.set_metadata("entity_count", refined.entities.len());
        refined.set_metadata("relationship_count", refined.relationships.len());
        refined
    }

    fn expand_coverage(
        &self,
        ontology: &mut Ontology,
        context: &OntologyGenerationContext,
        text: &str,
    ) {
        let settings = context.settings();
        let relaxed_threshold = (settings.confidence_threshold - RELAXATION).max(0.0);
        let catalogs = [LEGAL_PATTERNS, MEDICAL_PATTERNS, BUSINESS_PATTERNS, GENERAL_PATTERNS];

        let wider = self.extract_with_catalogs(text, context, &catalogs, Some(relaxed_threshold));

        // a text already extracted under any type is not added again
        let known_text: HashSet<&str> = ontology.entities.iter().map(|e| e.text.as_str()).collect();

        let mut next = next_entity_number(ontology);
        let mut added = Vec::new();
        for mut entity in wider.entities {
            if known_text.contains(entity.text.as_str()) {
                continue;
            }
            if settings.max_entities > 0
                && ontology.entities.len() + added.len() >= settings.max_entities
            {
                break;
            }
            entity.id = entity_id(next);
            next += 1;
            added.push(entity);
        }

        if added.is_empty() {
            return;
        }
        let first_new = ontology.entities.len();
        ontology.entities.extend(added);

        // only pairs touching new entities are scored; earlier pruning stands
        match self.infer_new_relationships(&ontology.entities, first_new, context, text) {
            Ok(found) => {
                let room = match settings.max_relationships {
                    0 => usize::MAX,
                    cap => cap.saturating_sub(ontology.relationships.len()),
                };
                let mut next = next_relationship_number(ontology);
                for mut rel in found.into_iter().take(room) {
                    rel.id = relationship_id(next);
                    next += 1;
                    ontology.relationships.push(rel);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "relationship inference failed during refinement");
                ontology.set_metadata("relationship_error", e.to_string());
            }
        }
    }
}

fn next_relationship_number(ontology: &Ontology) -> usize {
    ontology
        .relationships
        .iter()
        .filter_map(|r| id_number(&r.id))
        .max()
        .unwrap_or(0)
        + 1
}

fn relationship_id(n: usize) -> String {
    format!("rel_{:04}", n)
}

fn next_entity_number(ontology: &Ontology) -> usize {
    ontology
        .entities
        .iter()
        .filter_map(|e| e.id.strip_prefix("ent_")?.parse::<usize>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

/// Drop dangling, self-loop and duplicate relationships
pub fn prune_invalid_relationships(ontology: &mut Ontology) {
    let ids: HashSet<String> = ontology.entities.iter().map(|e| e.id.clone()).collect();
    let mut seen_ids = HashSet::new();
    let mut seen_triples = HashSet::new();

    ontology.relationships.retain(|r| {
        ids.contains(&r.source_id)
            && ids.contains(&r.target_id)
            && r.source_id != r.target_id
            && seen_ids.insert(r.id.clone())
            && seen_triples.insert((
                r.source_id.clone(),
                r.target_id.clone(),
                r.relationship_type.clone(),
            ))
    });
}

/// Normalise entity labels and drop entities that remain unclear
pub fn clarify_labels(ontology: &mut Ontology, min_len: usize) {
    for entity in &mut ontology.entities {
        let cleaned = entity
            .text
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '$' && c != '%')
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        entity.text = cleaned;
        entity.entity_type = pascal_case(&entity.entity_type);
    }

    ontology.entities.retain(|e| {
        e.text.chars().count() >= min_len.max(1) && e.text.chars().any(|c| c.is_alphanumeric())
    });
    drop_dangling(ontology);
}

fn pascal_case(label: &str) -> String {
    label
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Retype or drop relationships whose endpoints do not fit their type
pub fn prune_implausible_relationships(ontology: &mut Ontology) {
    let profile = DomainProfile::for_domain(&ontology.domain);
    let types: HashMap<String, String> = ontology
        .entities
        .iter()
        .map(|e| (e.id.clone(), e.entity_type.clone()))
        .collect();

    let mut kept = Vec::with_capacity(ontology.relationships.len());
    for mut rel in std::mem::take(&mut ontology.relationships) {
        let (Some(source), Some(target)) = (types.get(&rel.source_id), types.get(&rel.target_id))
        else {
            continue;
        };
        if profile.relationship_plausibility(&rel.relationship_type, source, target) > 0.0 {
            kept.push(rel);
        } else if rel.confidence >= RETYPE_CONFIDENCE {
            rel.relationship_type = GENERIC_RELATIONSHIP.to_string();
            kept.push(rel);
        }
    }
    ontology.relationships = kept;
}

/// Drop low-confidence entities outside the domain taxonomy
pub fn align_with_domain(ontology: &mut Ontology) {
    let profile = DomainProfile::for_domain(&ontology.domain);
    ontology.entities.retain(|e| {
        profile.expects_entity_type(&e.entity_type) || e.confidence >= ALIGNMENT_KEEP_CONFIDENCE
    });
    drop_dangling(ontology);
}

fn drop_dangling(ontology: &mut Ontology) {
    let ids: HashSet<&str> = ontology.entities.iter().map(|e| e.id.as_str()).collect();
    ontology
        .relationships
        .retain(|r| ids.contains(r.source_id.as_str()) && ids.contains(r.target_id.as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontoforge_core::{Entity, Relationship};

    fn sample() -> Ontology {
        let mut o = Ontology::empty("general");
        o.entities = vec![
            Entity::new("ent_0001", "Alice", "Person", 0.6),
            Entity::new("ent_0002", "Bob", "Person", 0.6),
            Entity::new("ent_0003", "2024-01-05", "Date", 0.9),
        ];
        o.relationships = vec![
            Relationship::new("rel_0001", "ent_0001", "ent_0002", "manages", 0.9),
            Relationship::new("rel_0002", "ent_0001", "ent_0002", "manages", 0.8),
            Relationship::new("rel_0003", "ent_0001", "ent_0009", "manages", 0.8),
            Relationship::new("rel_0004", "ent_0002", "ent_0002", "manages", 0.8),
            Relationship::new("rel_0005", "ent_0003", "ent_0001", "manages", 0.5),
        ];
        o
    }

    #[test]
    fn test_actions_for_score() {
        let score = CriticScore::from_dimensions(0.5, 0.9, 0.9, 0.9, 0.4, 0.9);
        assert_eq!(
            RefinementAction::for_score(&score),
            vec![
                RefinementAction::ExpandCoverage,
                RefinementAction::PruneImplausibleRelationships
            ]
        );
        assert!(RefinementAction::for_score(&CriticScore::uniform(0.9)).is_empty());
    }

    #[test]
    fn test_action_for_each_dimension() {
        for dimension in ontoforge_core::DIMENSIONS {
            assert!(RefinementAction::for_dimension(dimension).is_some());
        }
        assert_eq!(
            RefinementAction::for_dimension("granularity"),
            Some(RefinementAction::MergeDuplicates)
        );
        assert!(RefinementAction::for_dimension("overall").is_none());
    }

    #[test]
    fn test_prune_invalid_relationships() {
        let mut o = sample();
        prune_invalid_relationships(&mut o);
        let ids: Vec<&str> = o.relationships.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rel_0001", "rel_0005"]);
    }

    #[test]
    fn test_prune_implausible_relationships() {
        let mut o = sample();
        prune_invalid_relationships(&mut o);
        prune_implausible_relationships(&mut o);
        // a Date cannot manage anyone and the edge is weak
        assert_eq!(o.relationships.len(), 1);
        assert_eq!(o.relationships[0].relationship_type, "manages");
    }

    #[test]
    fn test_clarify_labels() {
        let mut o = Ontology::empty("general");
        o.entities = vec![
            Entity::new("ent_0001", "  \"Acme   Corp\" ", "organization", 0.8),
            Entity::new("ent_0002", "--", "Concept", 0.6),
        ];
        clarify_labels(&mut o, 2);
        assert_eq!(o.entities.len(), 1);
        assert_eq!(o.entities[0].text, "Acme Corp");
        assert_eq!(o.entities[0].entity_type, "Organization");
        assert_eq!(pascal_case("monetary_amount"), "MonetaryAmount");
    }

    #[test]
    fn test_align_with_domain() {
        let mut o = Ontology::empty("medical");
        o.entities = vec![
            Entity::new("ent_0001", "aspirin", "Medication", 0.9),
            Entity::new("ent_0002", "Widget", "Gadget", 0.5),
            Entity::new("ent_0003", "Gizmo", "Gadget", 0.9),
        ];
        o.relationships = vec![Relationship::new("rel_0001", "ent_0002", "ent_0001", "related_to", 0.6)];

        align_with_domain(&mut o);
        assert_eq!(o.entities.len(), 2);
        assert!(o.relationships.is_empty());
    }

    #[test]
    fn test_refine_records_actions_and_keeps_input() {
        let generator = OntologyGenerator::new();
        let ctx = OntologyGenerationContext::new("doc", "general");
        let text = "Alice manages Bob. Revenue grew 12% in Q3.";
        let original = generator.generate_ontology(text, &ctx);

        let feedback = CriticScore::from_dimensions(0.3, 0.9, 0.9, 0.9, 0.9, 0.9);
        let refined = generator.refine_ontology(&original, &feedback, &ctx, text);

        assert_eq!(refined.metadata["refinement_actions"][0], "expand_coverage");
        assert!(refined.entities.len() >= original.entities.len());
        assert!(refined.entities.iter().any(|e| e.entity_type == "Percentage"));
        let ids: HashSet<&str> = refined.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), refined.entities.len());
    }

    #[test]
    fn test_expansion_keeps_pruned_relationships_out() {
        let generator = OntologyGenerator::new();
        let ctx = OntologyGenerationContext::new("doc", "general");
        let text = "Alice manages Bob. Revenue grew 12% in Q3.";
        let mut pruned = generator.generate_ontology(text, &ctx);
        assert!(!pruned.relationships.is_empty());
        pruned.relationships.clear();
        let before: HashSet<String> = pruned.entities.iter().map(|e| e.id.clone()).collect();

        let feedback = CriticScore::from_dimensions(0.3, 0.9, 0.9, 0.9, 0.9, 0.9);
        let refined = generator.refine_ontology(&pruned, &feedback, &ctx, text);

        assert!(refined.entities.len() > pruned.entities.len());
        for (n, rel) in refined.relationships.iter().enumerate() {
            assert!(!before.contains(&rel.source_id) || !before.contains(&rel.target_id));
            assert_eq!(rel.id, relationship_id(n + 1));
        }
    }

    #[test]
    fn test_next_relationship_number() {
        assert_eq!(next_relationship_number(&sample()), 6);
        assert_eq!(next_relationship_number(&Ontology::empty("general")), 1);
    }

    #[test]
    fn test_next_entity_number() {
        assert_eq!(next_entity_number(&sample()), 4);
        assert_eq!(next_entity_number(&Ontology::empty("general")), 1);
    }
}
