//! OntoForge Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout OntoForge:
//! - Ontology models (entities, relationships, ontologies)
//! - Extraction context and configuration
//! - Critic scores and the fixed dimension weighting
//! - Domain taxonomies
//! - Common error types
//! - The pluggable fallback contract

pub mod config;
pub mod domain;

pub use config::{
    CacheConfig, ConfigError, ConfigRangeError, ConfigSource, CustomRule, EngineConfig,
    ExtractionConfig, FallbackConfig, FallbackTrigger, LoggingConfig, RefinementConfig,
};
pub use domain::DomainProfile;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Raised when a merge threshold falls outside `[0, 1]`
#[derive(Error, Debug, Clone, PartialEq)]
#[error("merge threshold {threshold} is outside the range [0, 1]")]
pub struct DeduplicationRangeError {
    pub threshold: f64,
}

/// Raised when a relationship worker fails; aborts the whole inference call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("relationship worker {worker} failed: {message}")]
pub struct WorkerFailure {
    pub worker: usize,
    pub message: String,
}

/// Core error types for OntoForge operations
#[derive(Error, Debug)]
pub enum OntoError {
    #[error(transparent)]
    ConfigRange(#[from] ConfigRangeError),

    #[error(transparent)]
    DeduplicationRange(#[from] DeduplicationRangeError),

    #[error(transparent)]
    WorkerFailure(#[from] WorkerFailure),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid ontology: {0}")]
    InvalidOntology(String),

    #[error("Fallback error: {0}")]
    FallbackError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, OntoError>;

// ============================================================================
// Ontology Models
// ============================================================================

/// An extracted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identifier, `ent_0001` style, unique within one ontology
    pub id: String,

    /// Surface text as it appears in the source
    pub text: String,

    /// Entity type (e.g. "Person", "Date")
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,

    /// Optional extraction properties
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    /// Create a new entity
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        entity_type: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            entity_type: entity_type.into(),
            confidence,
            properties: BTreeMap::new(),
        }
    }

    /// Add a property value
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// A typed, directed relationship between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Identifier, `rel_0001` style
    pub id: String,

    /// Source entity id
    pub source_id: String,

    /// Target entity id
    pub target_id: String,

    /// Relationship type (e.g. "manages", "related_to")
    #[serde(rename = "type")]
    pub relationship_type: String,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
}

impl Relationship {
    /// Create a new relationship
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type: relationship_type.into(),
            confidence,
        }
    }
}

/// The entity + relationship graph produced for one document
///
/// Every field is always present; failures degrade to empty lists and a
/// populated `metadata` map rather than missing substructures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ontology {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub domain: String,
}

impl Ontology {
    /// Create an empty ontology for a domain
    pub fn empty(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    /// Set a metadata entry
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set a metadata entry in place
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Look up an entity by id
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Index entities by id
    pub fn entity_index(&self) -> HashMap<&str, &Entity> {
        self.entities.iter().map(|e| (e.id.as_str(), e)).collect()
    }

    /// Whether the ontology holds neither entities nor relationships
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

// ============================================================================
// Extraction Context
// ============================================================================

/// Kind of data being processed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    #[default]
    Text,
    Json,
    Csv,
    Structured,
}

/// Extraction strategy selection policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractionStrategy {
    #[default]
    RuleBased,
    LlmBased,
    Hybrid,
}

impl ExtractionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleBased => "rule_based",
            Self::LlmBased => "llm_based",
            Self::Hybrid => "hybrid",
        }
    }

    /// Whether this strategy may consult the fallback backend
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, Self::RuleBased)
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inputs for one extraction call, immutable for its duration
#[derive(Debug, Clone)]
pub struct OntologyGenerationContext {
    /// Identifier of the source document
    pub data_source: String,

    /// Kind of input data
    pub data_type: DataType,

    /// Domain name ("general", "legal", "medical", "business")
    pub domain: String,

    /// Extraction strategy
    pub extraction_strategy: ExtractionStrategy,

    /// Extraction configuration
    pub config: ConfigSource,
}

impl OntologyGenerationContext {
    /// Create a rule-based text context with the default configuration
    pub fn new(data_source: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            data_type: DataType::Text,
            domain: domain.into(),
            extraction_strategy: ExtractionStrategy::RuleBased,
            config: ConfigSource::Default,
        }
    }

    /// Set the extraction strategy
    pub fn with_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.extraction_strategy = strategy;
        self
    }

    /// Set the data type
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Set the configuration
    pub fn with_config(mut self, config: impl Into<ConfigSource>) -> Self {
        self.config = config.into();
        self
    }

    /// Effective extraction settings
    pub fn settings(&self) -> &ExtractionConfig {
        self.config.settings()
    }
}

// ============================================================================
// Critic Scores
// ============================================================================

/// Dimension names, in weight order
pub const DIMENSIONS: [&str; 6] = [
    "completeness",
    "consistency",
    "clarity",
    "granularity",
    "relationship_coherence",
    "domain_alignment",
];

/// Fixed weights used wherever `overall` is derived; they sum to 1.0
pub const DIMENSION_WEIGHTS: [f64; 6] = [0.25, 0.20, 0.15, 0.15, 0.15, 0.10];

/// Multi-dimension quality score for one ontology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticScore {
    pub completeness: f64,
    pub consistency: f64,
    pub clarity: f64,
    pub granularity: f64,
    pub relationship_coherence: f64,
    pub domain_alignment: f64,
    pub overall: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
}

impl CriticScore {
    /// Build a score from its six dimensions; `overall` is derived
    pub fn from_dimensions(
        completeness: f64,
        consistency: f64,
        clarity: f64,
        granularity: f64,
        relationship_coherence: f64,
        domain_alignment: f64,
    ) -> Self {
        let mut score = Self {
            completeness: completeness.clamp(0.0, 1.0),
            consistency: consistency.clamp(0.0, 1.0),
            clarity: clarity.clamp(0.0, 1.0),
            granularity: granularity.clamp(0.0, 1.0),
            relationship_coherence: relationship_coherence.clamp(0.0, 1.0),
            domain_alignment: domain_alignment.clamp(0.0, 1.0),
            overall: 0.0,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            recommendations: Vec::new(),
        };
        score.overall = weighted_overall(&score.dimension_values());
        score
    }

    /// Same value on every dimension
    pub fn uniform(value: f64) -> Self {
        Self::from_dimensions(value, value, value, value, value, value)
    }

    /// Dimension values in `DIMENSIONS` order
    pub fn dimension_values(&self) -> [f64; 6] {
        [
            self.completeness,
            self.consistency,
            self.clarity,
            self.granularity,
            self.relationship_coherence,
            self.domain_alignment,
        ]
    }

    /// `(name, value)` pairs in `DIMENSIONS` order
    pub fn dimensions(&self) -> [(&'static str, f64); 6] {
        let values = self.dimension_values();
        std::array::from_fn(|i| (DIMENSIONS[i], values[i]))
    }

    /// Look up a dimension by name
    pub fn dimension(&self, name: &str) -> Option<f64> {
        self.dimensions()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// Lowest-scoring dimension; ties resolve to the heavier weight
    pub fn weakest_dimension(&self) -> (&'static str, f64) {
        self.dimensions()
            .into_iter()
            .fold(
                (DIMENSIONS[0], f64::INFINITY),
                |acc, d| if d.1 < acc.1 { d } else { acc },
            )
    }
}

/// Weighted mean of the six dimensions, rounded to six decimals so that band
/// boundaries compare exactly.
pub fn weighted_overall(values: &[f64; 6]) -> f64 {
    let raw: f64 = values
        .iter()
        .zip(DIMENSION_WEIGHTS.iter())
        .map(|(v, w)| v * w)
        .sum();
    ((raw * 1_000_000.0).round() / 1_000_000.0).clamp(0.0, 1.0)
}

// ============================================================================
// Traits
// ============================================================================

/// Pluggable fallback collaborator invoked below a confidence threshold
///
/// Implementations own their own transport, timeout and enablement; the core
/// only calls `complete` synchronously when `is_enabled` reports true.
pub trait FallbackBackend: Send + Sync {
    /// Whether the backend may be called
    fn is_enabled(&self) -> bool;

    /// Produce a completion for a prompt
    fn complete(&self, prompt: &str) -> Result<String>;

    /// Backend name for logging
    fn name(&self) -> &str {
        "fallback"
    }
}

// ============================================================================
// Tests
// ============================================================================
