//! OntoForge Extractor - Ontology extraction pipeline
//!
//! Implements pattern-based entity recognition, proximity-based relationship
//! inference, entity deduplication and feedback-driven refinement.

use ontoforge_core::{CriticScore, Ontology, OntologyGenerationContext};

pub mod dedup;
pub mod fallback;
pub mod generator;
pub mod ner;
pub mod patterns;
pub mod refine;
pub mod relation;
pub mod resolver;

pub use dedup::{apply_merges, suggest_merges, MergeEvidence, MergeSuggestion};
pub use fallback::MockFallback;
pub use generator::OntologyGenerator;
pub use refine::RefinementAction;
pub use relation::{IdSequence, ProximityScorer, RelationScorer};

/// Trait for ontology extractors driven by a refinement loop
pub trait OntologyExtractor: Send + Sync {
    /// Produce an ontology for a document
    fn generate(&self, text: &str, context: &OntologyGenerationContext) -> Ontology;

    /// Produce an improved copy of `ontology` using critic feedback
    fn refine(
        &self,
        ontology: &Ontology,
        feedback: &CriticScore,
        context: &OntologyGenerationContext,
        text: &str,
    ) -> Ontology;
}

impl OntologyExtractor for OntologyGenerator {
    fn generate(&self, text: &str, context: &OntologyGenerationContext) -> Ontology {
        self.generate_ontology(text, context)
    }

    fn refine(
        &self,
        ontology: &Ontology,
        feedback: &CriticScore,
        context: &OntologyGenerationContext,
        text: &str,
    ) -> Ontology {
        self.refine_ontology(ontology, feedback, context, text)
    }
}
