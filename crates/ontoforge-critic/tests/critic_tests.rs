//! Critic tests over extractor output

use ontoforge_core::OntologyGenerationContext;
use ontoforge_critic::{evaluate_ontology, explain_score};
use ontoforge_extractor::OntologyGenerator;
use proptest::prelude::*;

#[test]
fn test_scenario_scores() {
    let generator = OntologyGenerator::new();
    let ctx = OntologyGenerationContext::new("scenario", "general");
    let ontology =
        generator.generate_ontology("Alice manages Bob. Bob supervises Charlie.", &ctx);

    let score = evaluate_ontology(&ontology, &ctx);
    assert_eq!(score.consistency, 1.0);
    assert_eq!(score.domain_alignment, 1.0);
    assert!(score.relationship_coherence > 0.8);
    assert!(score.overall > 0.5 && score.overall < 1.0);

    let explanations = explain_score(&score);
    assert_eq!(explanations.len(), 7);
}

#[test]
fn test_richer_document_scores_higher_completeness() {
    let generator = OntologyGenerator::new();
    let ctx = OntologyGenerationContext::new("doc", "general");

    let sparse = generator.generate_ontology("Alice arrived.", &ctx);
    let rich = generator.generate_ontology(
        "Alice manages Bob at Acme Corp in Boston. Bob supervises Charlie. \
         Dave works for Acme Corp since 2021-03-01. Erin owns Globex Inc.",
        &ctx,
    );

    let sparse = evaluate_ontology(&sparse, &ctx);
    let rich = evaluate_ontology(&rich, &ctx);
    assert!(rich.completeness > sparse.completeness);
}

#[test]
fn test_score_serialises() {
    let ctx = OntologyGenerationContext::new("doc", "general");
    let ontology = OntologyGenerator::new().generate_ontology("Alice manages Bob.", &ctx);
    let value = serde_json::to_value(evaluate_ontology(&ontology, &ctx)).unwrap();

    for key in ["completeness", "overall", "strengths", "weaknesses", "recommendations"] {
        assert!(value.get(key).is_some(), "missing {}", key);
    }
}

proptest! {
    #[test]
    fn overall_is_weighted_mean_in_range(text in "[A-Za-z .,]{0,120}") {
        let ctx = OntologyGenerationContext::new("fuzz", "general");
        let ontology = OntologyGenerator::new().generate_ontology(&text, &ctx);
        let score = evaluate_ontology(&ontology, &ctx);

        prop_assert!((0.0..=1.0).contains(&score.overall));
        for (_, value) in score.dimensions() {
            prop_assert!((0.0..=1.0).contains(&value));
        }
        prop_assert_eq!(score.weaknesses.len(), score.recommendations.len());
    }

    #[test]
    fn raising_one_dimension_never_lowers_overall(
        base in 0.0f64..=1.0,
        bump in 0.0f64..=0.5,
        index in 0usize..6,
    ) {
        let mut values = [base; 6];
        let lower = ontoforge_core::weighted_overall(&values);
        values[index] = (base + bump).min(1.0);
        let higher = ontoforge_core::weighted_overall(&values);
        prop_assert!(higher >= lower);
    }
}
