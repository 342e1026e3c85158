//! Mediator tests with scripted and real extractors

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ontoforge_core::{
    CriticScore, Entity, Ontology, OntologyGenerationContext, RefinementConfig, Relationship,
};
use ontoforge_critic::evaluate_ontology;
use ontoforge_extractor::{OntologyExtractor, OntologyGenerator};
use ontoforge_mediator::{OntologyMediator, Priority, RefinementState, CONVERGED_ACTION};
use proptest::prelude::*;

fn sparse() -> Ontology {
    let mut ontology = Ontology::empty("general");
    ontology.entities = vec![Entity::new("ent_0001", "Alice", "Person", 0.6)];
    ontology
}

fn rich() -> Ontology {
    let mut ontology = Ontology::empty("general");
    ontology.entities = vec![
        Entity::new("ent_0001", "Alice", "Person", 0.9),
        Entity::new("ent_0002", "Bob", "Person", 0.9),
        Entity::new("ent_0003", "Carol", "Person", 0.9),
        Entity::new("ent_0004", "Dave", "Person", 0.9),
        Entity::new("ent_0005", "Acme Corp", "Organization", 0.85),
        Entity::new("ent_0006", "Globex Inc", "Organization", 0.85),
        Entity::new("ent_0007", "Boston", "Location", 0.7),
        Entity::new("ent_0008", "2024-01-05", "Date", 0.95),
    ];
    ontology.relationships = vec![
        Relationship::new("rel_0001", "ent_0001", "ent_0002", "manages", 0.9),
        Relationship::new("rel_0002", "ent_0003", "ent_0005", "works_for", 0.9),
        Relationship::new("rel_0003", "ent_0005", "ent_0007", "located_in", 0.9),
        Relationship::new("rel_0004", "ent_0006", "ent_0004", "employs", 0.9),
    ];
    ontology
}

/// Returns a sparse ontology first and a rich one after any refinement
#[derive(Default)]
struct ScriptedExtractor {
    refinements: AtomicUsize,
}

impl OntologyExtractor for ScriptedExtractor {
    fn generate(&self, _text: &str, _context: &OntologyGenerationContext) -> Ontology {
        sparse()
    }

    fn refine(
        &self,
        _ontology: &Ontology,
        _feedback: &CriticScore,
        _context: &OntologyGenerationContext,
        _text: &str,
    ) -> Ontology {
        self.refinements.fetch_add(1, Ordering::SeqCst);
        rich()
    }
}

fn context() -> OntologyGenerationContext {
    OntologyGenerationContext::new("doc", "general")
}

#[test]
fn test_refinement_reaches_threshold() {
    let target = evaluate_ontology(&rich(), &context()).overall;
    assert!(evaluate_ontology(&sparse(), &context()).overall < target);

    let extractor = Arc::new(ScriptedExtractor::default());
    let mediator = OntologyMediator::new(
        extractor.clone(),
        RefinementConfig {
            max_rounds: 5,
            convergence_threshold: target,
            ..Default::default()
        },
    )
    .unwrap();

    let outcome = mediator.run_refinement_cycle("ignored", &context());

    assert_eq!(extractor.refinements.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.rounds.len(), 2);
    assert!(outcome.threshold_met);
    assert_eq!(outcome.ontology, rich());
    assert_eq!(
        outcome.rounds[0].states,
        vec![
            RefinementState::Generated,
            RefinementState::Evaluated,
            RefinementState::Refining
        ]
    );
    assert!(!outcome.rounds[0].actions.is_empty());
    assert_eq!(outcome.rounds[1].states.last(), Some(&RefinementState::Converged));
    assert!(outcome.rounds[1].overall > outcome.rounds[0].overall);
}

#[test]
fn test_round_budget_limits_refinements() {
    let extractor = Arc::new(ScriptedExtractor::default());
    let mediator = OntologyMediator::new(
        extractor.clone(),
        RefinementConfig {
            max_rounds: 4,
            convergence_threshold: 1.0,
            ..Default::default()
        },
    )
    .unwrap();

    let outcome = mediator.run_refinement_cycle("ignored", &context());
    assert_eq!(outcome.rounds.len(), 4);
    assert_eq!(extractor.refinements.load(Ordering::SeqCst), 3);
    assert!(!outcome.threshold_met);
}

#[test]
fn test_outcome_serialises() {
    let mediator = OntologyMediator::new(
        Arc::new(OntologyGenerator::new()),
        RefinementConfig {
            max_rounds: 2,
            ..Default::default()
        },
    )
    .unwrap();
    let outcome =
        mediator.run_refinement_cycle("Alice manages Bob. Bob supervises Charlie.", &context());
    let value = serde_json::to_value(&outcome).unwrap();

    assert!(value["session_id"].is_string());
    assert!(value["rounds"].is_array());
    assert_eq!(value["final_state"], "converged");
    assert!(value["cache_stats"]["total_hit_rate"].is_number());
}

#[test]
fn test_batch_with_real_scores() {
    let mediator =
        OntologyMediator::new(Arc::new(OntologyGenerator::new()), RefinementConfig::default())
            .unwrap();
    let ontologies = vec![sparse(), rich()];
    let scores: Vec<CriticScore> = ontologies
        .iter()
        .map(|o| evaluate_ontology(o, &context()))
        .collect();

    let strategies = mediator
        .batch_suggest_strategies(&ontologies, &scores, &context())
        .unwrap();
    assert_eq!(strategies.len(), 2);
    for strategy in &strategies {
        assert!((0.0..=1.0).contains(&strategy.estimated_impact));
        assert!(!strategy.rationale.is_empty());
    }
    assert!(strategies[0].priority <= strategies[1].priority);

    let ranked = mediator
        .compare_strategies(&ontologies, &scores, &context())
        .unwrap();
    assert_eq!(ranked[0].index, 0);
    assert_eq!(ranked[0].rank, 1);
}

fn mediator_with_threshold(threshold: f64) -> OntologyMediator {
    OntologyMediator::new(
        Arc::new(OntologyGenerator::new()),
        RefinementConfig {
            convergence_threshold: threshold,
            ..Default::default()
        },
    )
    .unwrap()
}

proptest! {
    #[test]
    fn ranking_is_a_permutation_sorted_by_priority_score(
        overalls in prop::collection::vec((0.0f64..=1.0, 0usize..6), 0..12),
    ) {
        let mediator = mediator_with_threshold(0.85);
        let scores: Vec<CriticScore> = overalls
            .iter()
            .map(|(overall, recs)| {
                let mut score = CriticScore::uniform(*overall);
                score.recommendations = vec!["r".to_string(); *recs];
                score
            })
            .collect();
        let ontologies = vec![Ontology::empty("general"); scores.len()];

        let ranked = mediator.compare_strategies(&ontologies, &scores, &context()).unwrap();
        prop_assert_eq!(ranked.len(), scores.len());

        let mut indices: Vec<usize> = ranked.iter().map(|r| r.index).collect();
        indices.sort_unstable();
        prop_assert_eq!(indices, (0..scores.len()).collect::<Vec<_>>());

        for (position, pair) in ranked.windows(2).enumerate() {
            prop_assert_eq!(pair[0].rank, position + 1);
            prop_assert!(pair[0].priority_score >= pair[1].priority_score);
            if pair[0].priority_score == pair[1].priority_score {
                prop_assert!(pair[0].index < pair[1].index);
            }
        }
    }

    #[test]
    fn converged_scores_get_lowest_priority(
        threshold in 0.0f64..=1.0,
        overall in 0.0f64..=1.0,
        recs in 0usize..8,
    ) {
        let mediator = mediator_with_threshold(threshold);
        let mut score = CriticScore::uniform(overall);
        score.recommendations = vec!["r".to_string(); recs];

        let strategy =
            mediator.suggest_refinement_strategy(&Ontology::empty("general"), &score, &context());
        if score.overall >= threshold {
            prop_assert_eq!(strategy.action.as_str(), CONVERGED_ACTION);
            prop_assert_eq!(strategy.priority, Priority::Low);
        } else {
            prop_assert_ne!(strategy.action.as_str(), CONVERGED_ACTION);
        }
    }
}
