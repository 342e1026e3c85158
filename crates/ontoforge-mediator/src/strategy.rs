//! Refinement strategy suggestions and ranking

use std::collections::HashSet;

use ontoforge_core::{
    CriticScore, DomainProfile, Ontology, OntologyGenerationContext, DIMENSIONS,
    DIMENSION_WEIGHTS,
};
use ontoforge_extractor::{suggest_merges, RefinementAction};
use serde::{Deserialize, Serialize};

use crate::cycle::OntologyMediator;
use crate::{MediatorError, Result};

/// Action name for an ontology that needs no further refinement
pub const CONVERGED_ACTION: &str = "converged";

/// Urgency of a refinement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Lower scores and longer recommendation lists are more urgent
    pub fn from_score(overall: f64, recommendations: usize) -> Self {
        if overall < 0.4 || recommendations >= 4 {
            Self::Critical
        } else if overall < 0.6 || recommendations >= 3 {
            Self::High
        } else if overall < 0.75 || recommendations >= 1 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Suggested next step for one scored ontology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementStrategy {
    pub action: String,
    pub priority: Priority,
    pub rationale: String,
    /// Expected gain in overall score, in `[0, 1]`
    pub estimated_impact: f64,
    pub affected_entity_count: usize,
}

/// A strategy with its position in an urgency ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStrategy {
    /// Position of the ontology in the input
    pub index: usize,
    /// 1 is the most urgent
    pub rank: usize,
    pub strategy: RefinementStrategy,
    pub priority_score: f64,
}

/// `(1 - overall) * (1 + 0.1 * recommendations)`
pub fn priority_score(score: &CriticScore) -> f64 {
    (1.0 - score.overall) * (1.0 + 0.1 * score.recommendations.len() as f64)
}

impl OntologyMediator {
    /// Suggest a refinement strategy for one scored ontology
    pub fn suggest_refinement_strategy(
        &self,
        ontology: &Ontology,
        score: &CriticScore,
        context: &OntologyGenerationContext,
    ) -> RefinementStrategy {
        let threshold = self.config().convergence_threshold;

        if score.overall >= threshold {
            return RefinementStrategy {
                action: CONVERGED_ACTION.to_string(),
                priority: Priority::Low,
                rationale: format!(
                    "Overall score {:.0}% meets the {:.0}% convergence threshold",
                    score.overall * 100.0,
                    threshold * 100.0
                ),
                estimated_impact: 0.0,
                affected_entity_count: 0,
            };
        }

        let (dimension, value) = score.weakest_dimension();
        let action = RefinementAction::for_dimension(dimension)
            .unwrap_or(RefinementAction::ExpandCoverage);
        let recommendations = score.recommendations.len();

        RefinementStrategy {
            action: action.as_str().to_string(),
            priority: Priority::from_score(score.overall, recommendations),
            rationale: format!(
                "{} is the weakest dimension at {:.0}% with {} recommendation(s); \
                 overall {:.0}% is below the {:.0}% convergence threshold",
                dimension,
                value * 100.0,
                recommendations,
                score.overall * 100.0,
                threshold * 100.0
            ),
            estimated_impact: estimated_impact(dimension, value),
            affected_entity_count: self.affected_entities(action, ontology, context),
        }
    }

    /// One strategy per `(ontology, score)` pair
    pub fn batch_suggest_strategies(
        &self,
        ontologies: &[Ontology],
        scores: &[CriticScore],
        context: &OntologyGenerationContext,
    ) -> Result<Vec<RefinementStrategy>> {
        if ontologies.len() != scores.len() {
            return Err(MediatorError::LengthMismatch {
                ontologies: ontologies.len(),
                scores: scores.len(),
            });
        }

        let strategies: Vec<RefinementStrategy> = ontologies
            .iter()
            .zip(scores)
            .map(|(ontology, score)| self.suggest_refinement_strategy(ontology, score, context))
            .collect();

        tracing::debug!(count = strategies.len(), "strategies suggested");
        Ok(strategies)
    }

    /// Strategies ranked by priority score, most urgent first
    ///
    /// Ties keep input order.
    pub fn compare_strategies(
        &self,
        ontologies: &[Ontology],
        scores: &[CriticScore],
        context: &OntologyGenerationContext,
    ) -> Result<Vec<RankedStrategy>> {
        let strategies = self.batch_suggest_strategies(ontologies, scores, context)?;

        let mut ranked: Vec<RankedStrategy> = strategies
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(index, (strategy, score))| RankedStrategy {
                index,
                rank: 0,
                strategy,
                priority_score: priority_score(score),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.priority_score
                .total_cmp(&a.priority_score)
                .then(a.index.cmp(&b.index))
        });
        for (position, entry) in ranked.iter_mut().enumerate() {
            entry.rank = position + 1;
        }
        Ok(ranked)
    }

    /// Entities an action would touch
    fn affected_entities(
        &self,
        action: RefinementAction,
        ontology: &Ontology,
        context: &OntologyGenerationContext,
    ) -> usize {
        let profile = DomainProfile::for_domain(&context.domain);
        let ids: HashSet<&str> = ontology.entities.iter().map(|e| e.id.as_str()).collect();

        match action {
            RefinementAction::ExpandCoverage => ontology.entities.len(),
            RefinementAction::MergeDuplicates => {
                suggest_merges(ontology, self.config().merge_threshold, None, None)
                    .map(|suggestions| {
                        suggestions
                            .iter()
                            .flat_map(|s| [s.entity1_id.as_str(), s.entity2_id.as_str()])
                            .collect::<HashSet<_>>()
                            .len()
                    })
                    .unwrap_or(0)
            }
            RefinementAction::ClarifyLabels => ontology
                .entities
                .iter()
                .filter(|e| e.text != e.text.trim() || e.text.trim().chars().count() < 3)
                .count(),
            RefinementAction::AlignWithDomain => ontology
                .entities
                .iter()
                .filter(|e| !profile.expects_entity_type(&e.entity_type))
                .count(),
            RefinementAction::PruneInvalidRelationships => ontology
                .relationships
                .iter()
                .filter(|r| {
                    r.source_id == r.target_id
                        || !ids.contains(r.source_id.as_str())
                        || !ids.contains(r.target_id.as_str())
                })
                .flat_map(|r| [r.source_id.as_str(), r.target_id.as_str()])
                .filter(|id| ids.contains(id))
                .collect::<HashSet<_>>()
                .len(),
            RefinementAction::PruneImplausibleRelationships => {
                let types: std::collections::HashMap<&str, &str> = ontology
                    .entities
                    .iter()
                    .map(|e| (e.id.as_str(), e.entity_type.as_str()))
                    .collect();
                ontology
                    .relationships
                    .iter()
                    .filter(|r| {
                        match (types.get(r.source_id.as_str()), types.get(r.target_id.as_str())) {
                            (Some(source), Some(target)) => {
                                profile.relationship_plausibility(
                                    &r.relationship_type,
                                    source,
                                    target,
                                ) < 1.0
                            }
                            _ => false,
                        }
                    })
                    .flat_map(|r| [r.source_id.as_str(), r.target_id.as_str()])
                    .collect::<HashSet<_>>()
                    .len()
            }
        }
    }
}

/// Overall gain from lifting one dimension to a perfect score
fn estimated_impact(dimension: &str, value: f64) -> f64 {
    let weight = DIMENSIONS
        .iter()
        .position(|d| *d == dimension)
        .map(|i| DIMENSION_WEIGHTS[i])
        .unwrap_or(0.0);
    (weight * (1.0 - value)).clamp(0.0, 1.0)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ontoforge_core::{Entity, RefinementConfig};
    use ontoforge_extractor::OntologyGenerator;
    use std::sync::Arc;

    fn mediator() -> OntologyMediator {
        OntologyMediator::new(Arc::new(OntologyGenerator::new()), RefinementConfig::default())
            .unwrap()
    }

    fn context() -> OntologyGenerationContext {
        OntologyGenerationContext::new("doc", "general")
    }

    fn with_recommendations(overall: f64, count: usize) -> CriticScore {
        let mut score = CriticScore::uniform(overall);
        score.recommendations = vec!["do something".to_string(); count];
        score
    }

    #[test]
    fn test_priority_bands() {
        assert_eq!(Priority::from_score(0.2, 0), Priority::Critical);
        assert_eq!(Priority::from_score(0.7, 4), Priority::Critical);
        assert_eq!(Priority::from_score(0.5, 0), Priority::High);
        assert_eq!(Priority::from_score(0.7, 0), Priority::Medium);
        assert_eq!(Priority::from_score(0.8, 0), Priority::Low);
        assert_eq!(Priority::Critical.to_string(), "critical");
    }

    #[test]
    fn test_converged_strategy() {
        let strategy = mediator().suggest_refinement_strategy(
            &Ontology::empty("general"),
            &with_recommendations(0.9, 5),
            &context(),
        );
        assert_eq!(strategy.action, CONVERGED_ACTION);
        assert_eq!(strategy.priority, Priority::Low);
        assert_eq!(strategy.estimated_impact, 0.0);
    }

    #[test]
    fn test_weakest_dimension_drives_action() {
        let mut ontology = Ontology::empty("general");
        ontology.entities = vec![
            Entity::new("ent_0001", "Alice", "Person", 0.9),
            Entity::new("ent_0002", "Widget", "Gadget", 0.9),
        ];
        let score = CriticScore::from_dimensions(0.9, 0.9, 0.9, 0.9, 0.9, 0.1);
        let strategy = mediator().suggest_refinement_strategy(&ontology, &score, &context());

        assert_eq!(strategy.action, "align_with_domain");
        assert_eq!(strategy.affected_entity_count, 1);
        assert!((strategy.estimated_impact - 0.09).abs() < 1e-9);
        assert!(strategy.rationale.contains("domain_alignment"));
    }

    #[test]
    fn test_batch_length_mismatch() {
        let err = mediator()
            .batch_suggest_strategies(&[Ontology::empty("general")], &[], &context())
            .unwrap_err();
        assert_eq!(
            err,
            MediatorError::LengthMismatch {
                ontologies: 1,
                scores: 0
            }
        );
    }

    #[test]
    fn test_compare_ranks_by_priority_score() {
        let ontologies = vec![Ontology::empty("general"); 4];
        let scores = vec![
            with_recommendations(0.8, 0),
            with_recommendations(0.3, 2),
            with_recommendations(0.5, 0),
            with_recommendations(0.5, 0),
        ];

        let ranked = mediator()
            .compare_strategies(&ontologies, &scores, &context())
            .unwrap();
        let order: Vec<usize> = ranked.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);

        let ranks: Vec<usize> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert!((ranked[0].priority_score - 0.84).abs() < 1e-9);
    }

    #[test]
    fn test_priority_score() {
        assert!((priority_score(&with_recommendations(0.6, 3)) - 0.52).abs() < 1e-9);
        assert_eq!(priority_score(&with_recommendations(1.0, 3)), 0.0);
    }
}
