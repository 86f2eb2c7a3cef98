//! crates/cardio_core/src/import/mod.rs
//!
//! Bulk import of patient data: alias resolution, CSV/JSON parsing,
//! validation and the sequential mass-prediction pipeline.

pub mod aliases;
pub mod parser;
pub mod pipeline;
pub mod validate;

pub use parser::{parse, ImportFormat};
pub use pipeline::{
    BatchOutcome, ImportPipeline, ImportState, ParsedBatch, PredictionFailure, ScoredPatient,
    ValidatedBatch, ValidationFailed,
};
pub use validate::{RecordKey, ValidationReport, Violation};

use crate::ports::PortError;

/// Errors raised while importing a batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ImportError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("The file contains no data")]
    Empty,
    #[error("CSV error: {0}")]
    Csv(String),
    #[error("JSON error: {0}")]
    Json(String),
    #[error("JSON must be an object or an array of objects")]
    InvalidJsonShape,
    #[error(transparent)]
    Invalid(Box<ValidationFailed>),
    #[error("Cannot move the import from {from} to {to}")]
    IllegalTransition { from: &'static str, to: &'static str },
    #[error("Prediction setup failed: {0}")]
    Port(#[from] PortError),
}
