//! OntoForge Configuration Management
//!
//! Holds the per-call `ExtractionConfig` value object and the engine-level
//! configuration loaded from environment variables and TOML files, with
//! defaults suitable for development.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Extraction Configuration
// ============================================================================

/// A user-supplied extraction rule: matches of `pattern` become entities of
/// `entity_type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRule {
    pub pattern: String,
    pub entity_type: String,
}

impl CustomRule {
    pub fn new(pattern: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            entity_type: entity_type.into(),
        }
    }
}

/// When the fallback backend is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTrigger {
    /// Mean entity confidence is below the threshold
    #[default]
    MeanConfidence,
    /// Any single entity is below the threshold
    AnyEntity,
}

/// Extraction settings for one call
///
/// Construction never fails; call [`ExtractionConfig::validate`] to check
/// ranges explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum raw confidence for an entity to be kept
    pub confidence_threshold: f64,

    /// Ceiling applied to every entity confidence
    pub max_confidence: f64,

    /// Confidence below which the fallback backend is consulted
    pub llm_fallback_threshold: f64,

    /// Whether the threshold applies to the mean or to each entity
    pub fallback_trigger: FallbackTrigger,

    /// Maximum entities per call (0 = unlimited)
    pub max_entities: usize,

    /// Maximum relationships per call (0 = unlimited)
    pub max_relationships: usize,

    /// Minimum entity length in characters
    pub min_entity_length: usize,

    /// Token window for close co-occurrence
    pub window_size: usize,

    /// Maximum sentence distance between related entities (0 = unlimited)
    pub sentence_window: usize,

    /// Partition relationship inference across a worker pool
    pub enable_parallel_inference: bool,

    /// Worker pool size
    pub max_workers: usize,

    /// Attach extraction properties to entities
    pub include_properties: bool,

    /// Words never accepted as entities (case-insensitive)
    pub stopwords: Vec<String>,

    /// If non-empty, only these entity types are kept
    pub allowed_entity_types: Vec<String>,

    /// Domain dictionary: entity type -> terms
    pub domain_vocab: BTreeMap<String, Vec<String>>,

    /// Additional pattern rules
    pub custom_rules: Vec<CustomRule>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            max_confidence: 1.0,
            llm_fallback_threshold: 0.0,
            fallback_trigger: FallbackTrigger::MeanConfidence,
            max_entities: 0,
            max_relationships: 0,
            min_entity_length: 2,
            window_size: 5,
            sentence_window: 0,
            enable_parallel_inference: false,
            max_workers: 4,
            include_properties: false,
            stopwords: Vec::new(),
            allowed_entity_types: Vec::new(),
            domain_vocab: BTreeMap::new(),
            custom_rules: Vec::new(),
        }
    }
}

static DEFAULT_EXTRACTION: Lazy<ExtractionConfig> = Lazy::new(ExtractionConfig::default);

impl ExtractionConfig {
    /// Validate value ranges, naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigRangeError> {
        check_unit("confidence_threshold", self.confidence_threshold)?;
        check_unit("max_confidence", self.max_confidence)?;
        check_unit("llm_fallback_threshold", self.llm_fallback_threshold)?;

        if self.min_entity_length == 0 {
            return Err(ConfigRangeError::new(
                "min_entity_length",
                self.min_entity_length,
                "> 0",
            ));
        }
        if self.window_size == 0 {
            return Err(ConfigRangeError::new("window_size", self.window_size, "> 0"));
        }
        if self.max_workers == 0 {
            return Err(ConfigRangeError::new("max_workers", self.max_workers, ">= 1"));
        }
        Ok(())
    }

    /// Build from loosely-typed JSON
    ///
    /// `min_entity_length` and `max_confidence` fall back to their defaults
    /// when they cannot be coerced; any other mistyped field is an error.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let mut map = match value {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "extraction".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let min_len = map.remove("min_entity_length");
        let max_conf = map.remove("max_confidence");

        let mut config: Self = serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| ConfigError::InvalidValue {
                key: "extraction".to_string(),
                value: e.to_string(),
            })?;

        if let Some(raw) = min_len {
            config.min_entity_length = coerce_usize(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "min_entity_length is not an integer, using default");
                DEFAULT_EXTRACTION.min_entity_length
            });
        }
        if let Some(raw) = max_conf {
            config.max_confidence = coerce_f64(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "max_confidence is not a number, using default");
                DEFAULT_EXTRACTION.max_confidence
            });
        }

        Ok(config)
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigRangeError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigRangeError::new(field, value, "[0.0, 1.0]"))
    }
}

fn coerce_usize(value: &serde_json::Value) -> Option<usize> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .map(|n| n as usize),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Either the built-in defaults or a caller-owned configuration
///
/// Resolution caches key on the identity of the `Arc`, so callers should
/// reuse one `ConfigSource` across calls rather than rebuilding it.
#[derive(Debug, Clone, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    Custom(Arc<ExtractionConfig>),
}

impl ConfigSource {
    /// Effective settings
    pub fn settings(&self) -> &ExtractionConfig {
        match self {
            Self::Default => &*DEFAULT_EXTRACTION,
            Self::Custom(config) => config.as_ref(),
        }
    }

    /// Identity key used by resolution caches (0 for the defaults)
    pub fn identity(&self) -> usize {
        match self {
            Self::Default => 0,
            Self::Custom(config) => Arc::as_ptr(config) as usize,
        }
    }
}

impl From<ExtractionConfig> for ConfigSource {
    fn from(config: ExtractionConfig) -> Self {
        Self::Custom(Arc::new(config))
    }
}

impl From<Arc<ExtractionConfig>> for ConfigSource {
    fn from(config: Arc<ExtractionConfig>) -> Self {
        Self::Custom(config)
    }
}

impl From<Option<ExtractionConfig>> for ConfigSource {
    fn from(config: Option<ExtractionConfig>) -> Self {
        config.map(Self::from).unwrap_or_default()
    }
}

// ============================================================================
// Engine Configuration
// ============================================================================

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Default extraction settings
    pub extraction: ExtractionConfig,

    /// Refinement loop settings
    pub refinement: RefinementConfig,

    /// Validation cache settings
    pub cache: CacheConfig,

    /// Fallback backend settings
    pub fallback: FallbackConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Refinement
        if let Some(rounds) = env_parse("ONTOFORGE_MAX_ROUNDS")? {
            config.refinement.max_rounds = rounds;
        }
        if let Some(threshold) = env_parse("ONTOFORGE_CONVERGENCE_THRESHOLD")? {
            config.refinement.convergence_threshold = threshold;
        }
        if let Ok(domain) = std::env::var("ONTOFORGE_DOMAIN") {
            config.refinement.default_domain = domain;
        }

        // Extraction
        if let Some(parallel) = env_parse("ONTOFORGE_PARALLEL")? {
            config.extraction.enable_parallel_inference = parallel;
        }
        if let Some(workers) = env_parse("ONTOFORGE_MAX_WORKERS")? {
            config.extraction.max_workers = workers;
        }

        // Cache
        if let Some(size) = env_parse("ONTOFORGE_CACHE_MAX_SIZE")? {
            config.cache.max_size = size;
        }
        if let Some(mb) = env_parse("ONTOFORGE_CACHE_MAX_MEMORY_MB")? {
            config.cache.max_memory_mb = mb;
        }

        // Fallback
        if let Some(enabled) = env_parse("ONTOFORGE_FALLBACK_ENABLED")? {
            config.fallback.enabled = enabled;
        }

        // Logging
        if let Ok(level) = std::env::var("ONTOFORGE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = env_parse("ONTOFORGE_LOG_JSON")? {
            config.logging.json_format = json;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError { path, message },
            other => other,
        })
    }

    /// Parse TOML content
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let defaults = Self::default();

        // Only override if env values differ from defaults
        if env_config.refinement.max_rounds != defaults.refinement.max_rounds {
            self.refinement.max_rounds = env_config.refinement.max_rounds;
        }
        if env_config.refinement.convergence_threshold
            != defaults.refinement.convergence_threshold
        {
            self.refinement.convergence_threshold = env_config.refinement.convergence_threshold;
        }
        if env_config.refinement.default_domain != defaults.refinement.default_domain {
            self.refinement.default_domain = env_config.refinement.default_domain;
        }
        if env_config.extraction.enable_parallel_inference {
            self.extraction.enable_parallel_inference = true;
        }
        if env_config.extraction.max_workers != defaults.extraction.max_workers {
            self.extraction.max_workers = env_config.extraction.max_workers;
        }
        if env_config.fallback.enabled {
            self.fallback.enabled = true;
        }
        if env_config.logging.level != defaults.logging.level {
            self.logging.level = env_config.logging.level;
        }
        if env_config.logging.json_format {
            self.logging.json_format = true;
        }

        Ok(self)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigRangeError> {
        self.extraction.validate()?;
        self.refinement.validate()?;
        self.cache.validate()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

/// Refinement loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Maximum generate/evaluate rounds
    pub max_rounds: usize,

    /// Overall score at which refinement stops
    pub convergence_threshold: f64,

    /// Similarity threshold for duplicate merges during refinement
    pub merge_threshold: f64,

    /// Domain used when a caller does not name one
    pub default_domain: String,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            convergence_threshold: 0.85,
            merge_threshold: 0.85,
            default_domain: "general".to_string(),
        }
    }
}

impl RefinementConfig {
    pub fn validate(&self) -> Result<(), ConfigRangeError> {
        if self.max_rounds == 0 {
            return Err(ConfigRangeError::new("max_rounds", self.max_rounds, ">= 1"));
        }
        check_unit("convergence_threshold", self.convergence_threshold)?;
        check_unit("merge_threshold", self.merge_threshold)
    }
}

/// Validation cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries per cache layer
    pub max_size: usize,

    /// Approximate memory ceiling per layer in megabytes
    pub max_memory_mb: f64,

    /// Optional time-to-live for entries (seconds)
    pub ttl_seconds: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1_000,
            max_memory_mb: 100.0,
            ttl_seconds: None,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigRangeError> {
        if self.max_size == 0 {
            return Err(ConfigRangeError::new("max_size", self.max_size, ">= 1"));
        }
        if !(self.max_memory_mb > 0.0) {
            return Err(ConfigRangeError::new(
                "max_memory_mb",
                self.max_memory_mb,
                "> 0.0",
            ));
        }
        Ok(())
    }
}

/// Fallback backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Whether the fallback backend may be called
    pub enabled: bool,

    /// Timeout owned by the backend implementation (seconds)
    pub timeout_secs: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// A configuration value outside its legal range
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field} = {value} is out of range (expected {expected})")]
pub struct ConfigRangeError {
    pub field: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ConfigRangeError {
    pub fn new(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
