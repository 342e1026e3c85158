//! Refinement cycle
//!
//! `Generated -> Evaluated -> {Converged | Refining}`, with `Refining` looping
//! back to `Generated` until the overall score reaches the convergence
//! threshold or the round budget is spent.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use ontoforge_cache::{ValidationCache, ValidationCacheStats, ValidationOutcome};
use ontoforge_core::{
    CacheConfig, CriticScore, Ontology, OntologyGenerationContext, RefinementConfig,
};
use ontoforge_critic::{consistency_issues, OntologyCritic};
use ontoforge_extractor::{OntologyExtractor, RefinementAction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// State of one refinement round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementState {
    Generated,
    Evaluated,
    Refining,
    Converged,
}

/// History entry for one round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: usize,
    pub states: Vec<RefinementState>,
    pub overall: f64,
    /// Refinement actions requested after this round's evaluation
    pub actions: Vec<String>,
    pub entity_count: usize,
    pub relationship_count: usize,
    /// Structural issues found by the consistency check
    pub issues: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Result of a full refinement cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementOutcome {
    pub session_id: Uuid,
    pub ontology: Ontology,
    pub score: CriticScore,
    pub rounds: Vec<RoundRecord>,
    /// Whether the final overall score met the convergence threshold
    pub threshold_met: bool,
    pub final_state: RefinementState,
    pub cache_stats: ValidationCacheStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Orchestrates an extractor and the critic across refinement rounds
pub struct OntologyMediator {
    extractor: Arc<dyn OntologyExtractor>,
    critic: OntologyCritic,
    config: RefinementConfig,
    cache: Mutex<ValidationCache>,
}

impl OntologyMediator {
    /// Create a mediator; the refinement configuration is validated here
    pub fn new(extractor: Arc<dyn OntologyExtractor>, config: RefinementConfig) -> Result<Self> {
        Self::with_cache_config(extractor, config, &CacheConfig::default())
    }

    /// Create a mediator with explicit validation cache limits
    pub fn with_cache_config(
        extractor: Arc<dyn OntologyExtractor>,
        config: RefinementConfig,
        cache_config: &CacheConfig,
    ) -> Result<Self> {
        config.validate()?;
        cache_config.validate()?;

        Ok(Self {
            extractor,
            critic: OntologyCritic::new(),
            config,
            cache: Mutex::new(ValidationCache::with_config(cache_config)),
        })
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    pub fn critic(&self) -> &OntologyCritic {
        &self.critic
    }

    /// Validation cache statistics accumulated across cycles
    pub fn cache_stats(&self) -> ValidationCacheStats {
        self.lock_cache().stats()
    }

    /// Generate an ontology and refine it until it converges
    pub fn run_refinement_cycle(
        &self,
        text: &str,
        context: &OntologyGenerationContext,
    ) -> RefinementOutcome {
        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            %session_id,
            data_source = %context.data_source,
            max_rounds = self.config.max_rounds,
            threshold = self.config.convergence_threshold,
            "starting refinement cycle"
        );

        let mut ontology = self.extractor.generate(text, context);
        let mut rounds = Vec::new();
        let mut round = 1;

        let score = loop {
            let round_started = Utc::now();
            let mut states = vec![RefinementState::Generated];

            let issues = self.check_consistency(&ontology);
            let score = self.critic.evaluate_ontology(&ontology, context);
            states.push(RefinementState::Evaluated);

            let converged = score.overall >= self.config.convergence_threshold
                || round >= self.config.max_rounds;

            let actions: Vec<String> = if converged {
                states.push(RefinementState::Converged);
                Vec::new()
            } else {
                states.push(RefinementState::Refining);
                RefinementAction::for_score(&score)
                    .iter()
                    .map(|a| a.as_str().to_string())
                    .collect()
            };

            tracing::debug!(
                %session_id,
                round,
                overall = score.overall,
                issues = issues.len(),
                actions = ?actions,
                "round evaluated"
            );

            let mut record = RoundRecord {
                round,
                states,
                overall: score.overall,
                actions,
                entity_count: ontology.entities.len(),
                relationship_count: ontology.relationships.len(),
                issues,
                started_at: round_started,
                finished_at: round_started,
            };

            if converged {
                record.finished_at = Utc::now();
                rounds.push(record);
                break score;
            }

            let refined = self.extractor.refine(&ontology, &score, context, text);
            self.check_increment(&ontology, &refined);
            record.finished_at = Utc::now();
            rounds.push(record);

            ontology = refined;
            round += 1;
        };

        let threshold_met = score.overall >= self.config.convergence_threshold;
        let outcome = RefinementOutcome {
            session_id,
            ontology,
            threshold_met,
            final_state: RefinementState::Converged,
            cache_stats: self.cache_stats(),
            rounds,
            score,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            %session_id,
            rounds = outcome.rounds.len(),
            overall = outcome.score.overall,
            threshold_met,
            "refinement cycle finished"
        );
        outcome
    }

    // ========================================================================
    // Memoised validation
    // ========================================================================

    /// Consistency findings for an ontology
    ///
    /// Per-formula findings come first, followed by the whole-ontology
    /// findings memoised on the formula set.
    fn check_consistency(&self, ontology: &Ontology) -> Vec<String> {
        let formulas = formulas(ontology);
        let mut cache = self.lock_cache();
        let mut issues = Vec::new();

        for formula in &formulas {
            let outcome = match cache.get_formula(formula) {
                Some(outcome) => outcome,
                None => {
                    let outcome = formula_outcome(formula);
                    cache.set_formula(formula, outcome.clone());
                    outcome
                }
            };
            issues.extend(outcome.issues);
        }

        let outcome = match cache.get_consistency(&formulas) {
            Some(outcome) => outcome,
            None => {
                let outcome = ValidationOutcome::inconsistent(consistency_issues(ontology));
                cache.set_consistency(&formulas, outcome.clone());
                outcome
            }
        };
        issues.extend(outcome.issues);
        issues
    }

    /// Record the consistency of a refinement step as a diff over its input
    fn check_increment(&self, base: &Ontology, refined: &Ontology) {
        let before = formulas(base);
        let after = formulas(refined);
        let before_set: BTreeSet<&String> = before.iter().collect();
        let after_set: BTreeSet<&String> = after.iter().collect();

        let added: Vec<String> = after_set.difference(&before_set).map(|f| (*f).clone()).collect();
        let removed: Vec<String> = before_set.difference(&after_set).map(|f| (*f).clone()).collect();

        let mut cache = self.lock_cache();
        if cache.get_incremental(&before, &added, &removed).is_none() {
            let outcome = ValidationOutcome::inconsistent(consistency_issues(refined));
            cache.set_incremental(&before, &added, &removed, outcome.clone());
            cache.set_consistency(&after, outcome);
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ValidationCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One formula per relationship: `type(source:Type, target:Type)`
///
/// Endpoints missing from the ontology are typed `?`.
fn formulas(ontology: &Ontology) -> Vec<String> {
    let types: HashMap<&str, &str> = ontology
        .entities
        .iter()
        .map(|e| (e.id.as_str(), e.entity_type.as_str()))
        .collect();

    let mut formulas: Vec<String> = ontology
        .relationships
        .iter()
        .map(|r| {
            format!(
                "{}({}:{}, {}:{})",
                r.relationship_type,
                r.source_id,
                types.get(r.source_id.as_str()).copied().unwrap_or("?"),
                r.target_id,
                types.get(r.target_id.as_str()).copied().unwrap_or("?"),
            )
        })
        .collect();
    formulas.extend(
        ontology
            .entities
            .iter()
            .map(|e| format!("{}({})", e.entity_type, e.id)),
    );
    formulas
}

/// Well-formedness of a single relationship formula
fn formula_outcome(formula: &str) -> ValidationOutcome {
    let Some((_, args)) = formula.split_once('(') else {
        return ValidationOutcome::consistent();
    };
    let args = args.trim_end_matches(')');
    let Some((source, target)) = args.split_once(", ") else {
        return ValidationOutcome::consistent();
    };

    let mut issues = Vec::new();
    if source.ends_with(":?") || target.ends_with(":?") {
        issues.push(format!("{} has a missing endpoint", formula));
    }
    let id = |endpoint: &str| endpoint.split(':').next().unwrap_or_default().to_string();
    if id(source) == id(target) {
        issues.push(format!("{} is a self loop", formula));
    }
    ValidationOutcome::inconsistent(issues)
}

// ============================================================================
// Tests
// ============================================================================
