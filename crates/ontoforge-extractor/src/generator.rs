//! Ontology generation
//!
//! Ties the resolver, pattern compiler, scanner, fallback and relationship
//! inference together behind one object that owns every cache.

use std::sync::Arc;

use ontoforge_core::{
    Entity, FallbackBackend, Ontology, OntologyGenerationContext, Relationship, WorkerFailure,
};

use crate::fallback::{self, MockFallback};
use crate::ner::{collapse_mentions, is_malformed, resolve_overlaps, RuleScanner};
use crate::patterns::{catalog_for_domain, CompiledPattern, PatternCompiler, PatternSpec};
use crate::relation::{RelationScorer, RelationshipInference, PARALLEL_MIN_ENTITIES};
use crate::resolver::ConfigResolver;

/// Metadata status for input with nothing to extract
pub const STATUS_EMPTY_INPUT: &str = "empty_input";

/// Rule-based ontology generator with a pluggable fallback
pub struct OntologyGenerator {
    resolver: ConfigResolver,
    compiler: PatternCompiler,
    inference: RelationshipInference,
    fallback: Arc<dyn FallbackBackend>,
}

impl OntologyGenerator {
    /// Create a generator with the proximity scorer and a disabled mock fallback
    pub fn new() -> Self {
        let compiler = PatternCompiler::new();
        let inference = RelationshipInference::new(&compiler);
        Self {
            resolver: ConfigResolver::new(),
            compiler,
            inference,
            fallback: Arc::new(MockFallback::new()),
        }
    }

    /// Use a different fallback backend
    pub fn with_fallback(mut self, backend: Arc<dyn FallbackBackend>) -> Self {
        self.fallback = backend;
        self
    }

    /// Use a different relationship scorer
    pub fn with_scorer(mut self, scorer: Arc<dyn RelationScorer>) -> Self {
        self.inference = RelationshipInference::with_scorer(scorer);
        self
    }

    /// The configuration resolver
    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// The pattern compiler
    pub fn compiler(&self) -> &PatternCompiler {
        &self.compiler
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Extract entities with the domain's pattern catalog
    ///
    /// Never fails: text with nothing to extract yields an empty ontology
    /// whose metadata carries `status = "empty_input"`.
    pub fn extract_entities(&self, text: &str, context: &OntologyGenerationContext) -> Ontology {
        self.extract_with_catalogs(text, context, &catalog_for_domain(&context.domain), None)
    }

    pub(crate) fn extract_with_catalogs(
        &self,
        text: &str,
        context: &OntologyGenerationContext,
        catalogs: &[&'static [PatternSpec]],
        confidence_threshold: Option<f64>,
    ) -> Ontology {
        let mut ontology = Ontology::empty(context.domain.clone())
            .with_metadata("domain", context.domain.clone())
            .with_metadata("extraction_method", "rule_based");

        if is_malformed(text) {
            tracing::warn!(
                data_source = %context.data_source,
                "input has no extractable text, returning empty ontology"
            );
            ontology.set_metadata("status", STATUS_EMPTY_INPUT);
            ontology.set_metadata("entity_count", 0);
            return ontology;
        }

        let settings = context.settings();
        let resolved = self.resolver.resolve(&context.config);
        let compiled: Vec<Arc<[CompiledPattern]>> =
            catalogs.iter().map(|c| self.compiler.compile(c)).collect();

        let threshold = confidence_threshold.unwrap_or(settings.confidence_threshold);
        let mut scanner = RuleScanner::new(&resolved, threshold).with_patterns(&resolved.extra_patterns);
        for set in &compiled {
            scanner = scanner.with_patterns(set);
        }

        let candidates = resolve_overlaps(scanner.scan(text));
        ontology.entities =
            collapse_mentions(candidates, settings.max_entities, settings.include_properties);
        ontology.set_metadata("entity_count", ontology.entities.len());

        tracing::debug!(
            entities = ontology.entities.len(),
            domain = %context.domain,
            "entity extraction finished"
        );
        ontology
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Infer relationships between entities; a worker failure fails the call
    pub fn infer_relationships(
        &self,
        entities: &[Entity],
        context: &OntologyGenerationContext,
        text: &str,
    ) -> Result<Vec<Relationship>, WorkerFailure> {
        self.inference.infer(entities, context, text)
    }

    /// Infer relationships for entities appended from `first_new` onwards,
    /// against each other and the entities before them
    pub fn infer_new_relationships(
        &self,
        entities: &[Entity],
        first_new: usize,
        context: &OntologyGenerationContext,
        text: &str,
    ) -> Result<Vec<Relationship>, WorkerFailure> {
        self.inference.infer_extending(entities, first_new, context, text)
    }

    // ========================================================================
    // Full Pipeline
    // ========================================================================

    /// Extract entities, consult the fallback when warranted, and infer
    /// relationships
    ///
    /// Never fails for data problems. A worker failure leaves the entities in
    /// place with no relationships and a `relationship_error` metadata entry.
    pub fn generate_ontology(&self, text: &str, context: &OntologyGenerationContext) -> Ontology {
        tracing::info!(
            data_source = %context.data_source,
            domain = %context.domain,
            strategy = %context.extraction_strategy,
            "generating ontology"
        );

        let settings = context.settings();
        let mut ontology = self.extract_entities(text, context);
        let empty_input = ontology.metadata.contains_key("status");

        let mut fallback_used = false;
        if !empty_input
            && fallback::should_consult(
                context.extraction_strategy,
                self.fallback.as_ref(),
                &ontology.entities,
                settings.llm_fallback_threshold,
                settings.fallback_trigger,
            )
        {
            fallback_used = self.apply_fallback(&mut ontology, text, context);
        }

        let parallel = settings.enable_parallel_inference
            && ontology.entities.len() >= PARALLEL_MIN_ENTITIES;

        if !empty_input {
            match self.infer_relationships(&ontology.entities, context, text) {
                Ok(relationships) => ontology.relationships = relationships,
                Err(e) => {
                    tracing::warn!(error = %e, "relationship inference failed");
                    ontology.relationships.clear();
                    ontology.set_metadata("relationship_error", e.to_string());
                }
            }
        }

        ontology.set_metadata("strategy", context.extraction_strategy.as_str());
        ontology.set_metadata("entity_count", ontology.entities.len());
        ontology.set_metadata("relationship_count", ontology.relationships.len());
        ontology.set_metadata("parallel", parallel);
        ontology.set_metadata("fallback_used", fallback_used);

        tracing::info!(
            entities = ontology.entities.len(),
            relationships = ontology.relationships.len(),
            "ontology generated"
        );
        ontology
    }

    fn apply_fallback(
        &self,
        ontology: &mut Ontology,
        text: &str,
        context: &OntologyGenerationContext,
    ) -> bool {
        let prompt = fallback::build_prompt(&context.domain, text);
        let response = match self.fallback.complete(&prompt) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(backend = self.fallback.name(), error = %e, "fallback failed, keeping rule output");
                return false;
            }
        };

        let settings = context.settings();
        let resolved = self.resolver.resolve(&context.config);
        let found: Vec<_> = fallback::parse_response(&response, text)
            .into_iter()
            .filter(|e| resolved.accepts(&e.text, &e.entity_type))
            .filter(|e| e.confidence >= settings.confidence_threshold)
            .map(|mut e| {
                e.confidence = e.confidence.min(resolved.max_confidence);
                e
            })
            .collect();

        let entities = std::mem::take(&mut ontology.entities);
        let (merged, added) = fallback::merge_entities(
            entities,
            found,
            text,
            settings.max_entities,
            settings.include_properties,
        );
        ontology.entities = merged;

        tracing::debug!(backend = self.fallback.name(), added, "fallback consulted");
        if added > 0 {
            ontology.set_metadata("extraction_method", "rule_based+fallback");
        }
        true
    }
}

impl Default for OntologyGenerator {
    fn default() -> Self {
        Self::new()
    }
}
