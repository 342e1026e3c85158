//! OntoForge Mediator - Refinement orchestration
//!
//! Drives the generate, evaluate and refine loop between an extractor and the
//! critic until the ontology converges, and ranks refinement strategies for
//! batches of scored ontologies.

use ontoforge_core::ConfigRangeError;
use thiserror::Error;

pub mod cycle;
pub mod strategy;

pub use cycle::{OntologyMediator, RefinementOutcome, RefinementState, RoundRecord};
pub use strategy::{priority_score, Priority, RankedStrategy, RefinementStrategy, CONVERGED_ACTION};

/// Mediator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediatorError {
    #[error("got {ontologies} ontologies but {scores} scores")]
    LengthMismatch { ontologies: usize, scores: usize },

    #[error(transparent)]
    Config(#[from] ConfigRangeError),
}

pub type Result<T> = std::result::Result<T, MediatorError>;
