//! Property tests for extraction, inference and deduplication

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use ontoforge_core::{
    ConfigSource, Entity, ExtractionConfig, Ontology, OntologyGenerationContext,
};
use ontoforge_extractor::resolver::ConfigResolver;
use ontoforge_extractor::{suggest_merges, OntologyGenerator};

const NAMES: &[&str] = &[
    "Alice", "Bob", "Carol", "Dave", "Erin", "Frank", "Grace", "Heidi", "Ivan", "Judy",
    "Mallory", "Oscar", "Peggy", "Trent", "Victor", "Walter",
];

const VERBS: &[&str] = &["manages", "supervises", "employs", "owns", "met", "called"];

fn sentence() -> impl Strategy<Value = String> {
    (
        prop::sample::select(NAMES),
        prop::sample::select(VERBS),
        prop::sample::select(NAMES),
    )
        .prop_map(|(a, verb, b)| format!("{} {} {}.", a, verb, b))
}

fn document() -> impl Strategy<Value = String> {
    prop::collection::vec(sentence(), 1..12).prop_map(|s| s.join(" "))
}

fn entity_list() -> impl Strategy<Value = Vec<Entity>> {
    prop::collection::vec(
        (
            prop::sample::select(&["Acme Corp", "Acme Corporation", "ACME corp", "Globex", "Globex Inc", "Initech"][..]),
            prop::sample::select(&["Organization", "Company"][..]),
            0.1f64..1.0,
        ),
        0..14,
    )
    .prop_map(|items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (text, kind, confidence))| {
                Entity::new(format!("ent_{:04}", i + 1), text, kind, confidence)
            })
            .collect()
    })
}

fn check_well_formed(ontology: &Ontology) {
    let entity_ids: HashSet<&str> = ontology.entities.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(entity_ids.len(), ontology.entities.len());

    let mut rel_ids = HashSet::new();
    for rel in &ontology.relationships {
        assert!(rel_ids.insert(rel.id.as_str()), "duplicate id {}", rel.id);
        assert_ne!(rel.source_id, rel.target_id);
        assert!(entity_ids.contains(rel.source_id.as_str()));
        assert!(entity_ids.contains(rel.target_id.as_str()));
        assert!((0.0..=1.0).contains(&rel.confidence));
    }
}

proptest! {
    #[test]
    fn arbitrary_text_never_panics(text in ".{0,200}") {
        let generator = OntologyGenerator::new();
        let ctx = OntologyGenerationContext::new("fuzz", "general");
        let ontology = generator.generate_ontology(&text, &ctx);
        check_well_formed(&ontology);
    }

    #[test]
    fn generated_ontologies_are_well_formed(
        text in document(),
        domain in prop::sample::select(&["general", "legal", "medical", "business"][..]),
    ) {
        let generator = OntologyGenerator::new();
        let ctx = OntologyGenerationContext::new("doc", domain);
        let ontology = generator.generate_ontology(&text, &ctx);

        check_well_formed(&ontology);
        for entity in &ontology.entities {
            prop_assert!((0.0..=1.0).contains(&entity.confidence));
            prop_assert!(entity.confidence >= 0.5);
        }
    }

    #[test]
    fn relationship_ids_unique_across_workers(
        text in document(),
        workers in 1usize..=8,
    ) {
        let generator = OntologyGenerator::new();
        let ctx = OntologyGenerationContext::new("doc", "general").with_config(ExtractionConfig {
            enable_parallel_inference: true,
            max_workers: workers,
            ..Default::default()
        });
        let serial = generator.generate_ontology(&text, &OntologyGenerationContext::new("doc", "general"));
        let parallel = generator.generate_ontology(&text, &ctx);

        check_well_formed(&parallel);
        prop_assert_eq!(parallel.relationships.len(), serial.relationships.len());
    }

    #[test]
    fn merge_suggestions_respect_threshold(
        entities in entity_list(),
        threshold in 0.0f64..=1.0,
        limit in prop::option::of(0usize..6),
    ) {
        let ontology = Ontology {
            entities,
            ..Default::default()
        };
        let suggestions = suggest_merges(&ontology, threshold, limit, None).unwrap();

        if let Some(limit) = limit {
            prop_assert!(suggestions.len() <= limit);
        }

        let index = ontology.entity_index();
        let mut seen = HashSet::new();
        for s in &suggestions {
            prop_assert_ne!(&s.entity1_id, &s.entity2_id);
            prop_assert!(s.similarity_score > 0.0);
            prop_assert!(s.similarity_score >= threshold);
            prop_assert_eq!(
                &index[s.entity1_id.as_str()].entity_type,
                &index[s.entity2_id.as_str()].entity_type
            );
            let key = if s.entity1_id < s.entity2_id {
                (s.entity1_id.clone(), s.entity2_id.clone())
            } else {
                (s.entity2_id.clone(), s.entity1_id.clone())
            };
            prop_assert!(seen.insert(key));
        }
        for pair in suggestions.windows(2) {
            prop_assert!(pair[0].similarity_score >= pair[1].similarity_score);
        }
    }

    #[test]
    fn out_of_range_merge_threshold_rejected(threshold in prop_oneof![-10.0f64..-0.001, 1.001f64..10.0]) {
        let ontology = Ontology::default();
        prop_assert!(suggest_merges(&ontology, threshold, None, None).is_err());
    }

    #[test]
    fn resolution_is_idempotent(
        min_len in 1usize..6,
        stopwords in prop::collection::vec("[a-z]{2,8}", 0..5),
    ) {
        let resolver = ConfigResolver::new();
        let source = ConfigSource::from(Arc::new(ExtractionConfig {
            min_entity_length: min_len,
            stopwords,
            ..Default::default()
        }));

        let first = resolver.resolve(&source);
        let second = resolver.resolve(&source);

        prop_assert!(Arc::ptr_eq(&first, &second));
        prop_assert_eq!(resolver.misses(), 1);
        prop_assert_eq!(resolver.hits(), 1);
        prop_assert_eq!(first.min_len, min_len);
    }
}
