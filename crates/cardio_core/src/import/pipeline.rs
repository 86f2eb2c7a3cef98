//! crates/cardio_core/src/import/pipeline.rs
//!
//! The import state machine: `Idle -> Parsing -> Validating -> Predicting -> Done`,
//! with `Error` reachable from parsing, validating and predicting. A batch
//! rejected by validation can be corrected and validated again from `Error`.
//!
//! Stages are also encoded in types: a `ValidatedBatch` can only be obtained
//! from a clean validation, so predicting a batch with outstanding errors
//! cannot be expressed.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::parser::{self, ImportFormat};
use super::validate::{self, RecordKey, ValidationReport};
use super::ImportError;
use crate::domain::{PredictionCandidate, PredictionResult, ProcessedPatient};
use crate::ports::{PortResult, PredictionGateway};

//=========================================================================================
// Observable state
//=========================================================================================

/// Where an import currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImportState {
    Idle,
    Parsing,
    Validating,
    Predicting { completed: usize, total: usize },
    Done { succeeded: usize, attempted: usize },
    Error { message: String },
}

impl ImportState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Parsing => "parsing",
            Self::Validating => "validating",
            Self::Predicting { .. } => "predicting",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Prediction progress as a whole percentage.
    pub fn progress_percent(&self) -> u8 {
        match self {
            Self::Predicting { total: 0, .. } | Self::Done { .. } => 100,
            Self::Predicting { completed, total } => ((completed * 100) / total).min(100) as u8,
            _ => 0,
        }
    }

    fn allows(&self, next: &ImportState) -> bool {
        use ImportState::*;
        match (self, next) {
            (_, Idle) => true,
            (Predicting { .. }, Parsing | Validating) => false,
            (_, Parsing) => true,
            (Parsing | Error { .. }, Validating) => true,
            (Validating, Predicting { .. }) => true,
            (Predicting { .. }, Predicting { .. } | Done { .. }) => true,
            (Parsing | Validating | Predicting { .. }, Error { .. }) => true,
            _ => false,
        }
    }
}

//=========================================================================================
// Typed stages
//=========================================================================================

/// Records that have been parsed but not yet validated. Editable, so the
/// operator can fix rows and validate again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBatch {
    records: Vec<ProcessedPatient>,
}

impl ParsedBatch {
    pub fn new(records: Vec<ProcessedPatient>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ProcessedPatient] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<ProcessedPatient> {
        &mut self.records
    }

    pub fn into_records(self) -> Vec<ProcessedPatient> {
        self.records
    }

    /// Runs every validation rule. Succeeds only when no record has a violation.
    pub fn validate(self, today: NaiveDate) -> Result<ValidatedBatch, ValidationFailed> {
        let report = validate::validate_batch(&self.records, today);
        if report.is_clean() {
            Ok(ValidatedBatch {
                records: self.records,
            })
        } else {
            Err(ValidationFailed { report, batch: self })
        }
    }
}

/// A batch rejected by validation; the batch is handed back for correction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{} record(s) failed validation", .report.records.len())]
pub struct ValidationFailed {
    pub report: ValidationReport,
    pub batch: ParsedBatch,
}

/// A batch with zero validation errors, ready for prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    records: Vec<ProcessedPatient>,
}

impl ValidatedBatch {
    pub fn records(&self) -> &[ProcessedPatient] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The server's existing candidates followed by this batch.
    pub fn candidates(&self, existing: Vec<PredictionCandidate>) -> Vec<PredictionCandidate> {
        existing
            .into_iter()
            .chain(self.records.iter().cloned().map(PredictionCandidate::from))
            .collect()
    }

    /// Fetches the server's existing candidates, appends this batch and scores
    /// every candidate one at a time.
    pub async fn predict_all<G, F>(&self, gateway: &G, on_progress: F) -> PortResult<BatchOutcome>
    where
        G: PredictionGateway + ?Sized,
        F: FnMut(usize, usize),
    {
        let existing = gateway.existing_candidates().await?;
        Ok(predict_candidates(gateway, self.candidates(existing), on_progress).await)
    }
}

//=========================================================================================
// Prediction loop
//=========================================================================================

/// A candidate together with its prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPatient {
    pub patient: ProcessedPatient,
    pub patient_id: Option<String>,
    pub prediction: PredictionResult,
}

/// A candidate whose prediction call failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionFailure {
    pub key: RecordKey,
    pub message: String,
}

/// Result of a mass-prediction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<ScoredPatient>,
    pub failures: Vec<PredictionFailure>,
    pub attempted: usize,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }
}

/// Scores candidates strictly one after another so progress is monotonic.
///
/// A failed call is logged and recorded; it never aborts the rest of the batch.
/// `on_progress(completed, total)` fires after every candidate.
pub async fn predict_candidates<G, F>(
    gateway: &G,
    candidates: Vec<PredictionCandidate>,
    mut on_progress: F,
) -> BatchOutcome
where
    G: PredictionGateway + ?Sized,
    F: FnMut(usize, usize),
{
    let total = candidates.len();
    let mut outcome = BatchOutcome {
        attempted: total,
        ..Default::default()
    };

    for (done, candidate) in candidates.into_iter().enumerate() {
        match gateway.predict(&candidate).await {
            Ok(prediction) => outcome.results.push(ScoredPatient {
                patient: candidate.patient,
                patient_id: candidate.patient_id,
                prediction,
            }),
            Err(e) => {
                let key = RecordKey::of(&candidate.patient);
                warn!(record = %key, error = %e, "prediction failed, skipping record");
                outcome.failures.push(PredictionFailure {
                    key,
                    message: e.to_string(),
                });
            }
        }
        on_progress(done + 1, total);
    }

    info!(
        succeeded = outcome.succeeded(),
        attempted = outcome.attempted,
        "mass prediction finished"
    );
    outcome
}

//=========================================================================================
// Pipeline driver
//=========================================================================================

type Observer = Box<dyn FnMut(&ImportState) + Send>;

/// Drives one import through its states and reports each change to an observer.
pub struct ImportPipeline {
    state: ImportState,
    observer: Option<Observer>,
}

impl Default for ImportPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ImportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportPipeline")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ImportPipeline {
    pub fn new() -> Self {
        Self {
            state: ImportState::Idle,
            observer: None,
        }
    }

    pub fn with_observer(observer: impl FnMut(&ImportState) + Send + 'static) -> Self {
        Self {
            state: ImportState::Idle,
            observer: Some(Box::new(observer)),
        }
    }

    pub fn state(&self) -> &ImportState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.set(ImportState::Idle);
    }

    fn set(&mut self, next: ImportState) {
        self.state = next;
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.state);
        }
    }

    fn check(&self, next: &ImportState) -> Result<(), ImportError> {
        if self.state.allows(next) {
            Ok(())
        } else {
            Err(ImportError::IllegalTransition {
                from: self.state.name(),
                to: next.name(),
            })
        }
    }

    fn transition(&mut self, next: ImportState) -> Result<(), ImportError> {
        self.check(&next)?;
        self.set(next);
        Ok(())
    }

    fn fail(&mut self, message: String) {
        // Error is reachable from every working state, so this cannot be refused.
        let _ = self.transition(ImportState::Error { message });
    }

    /// Parses uploaded text. Moves to `Error` when the text cannot be read.
    pub fn parse(&mut self, text: &str, format: ImportFormat) -> Result<ParsedBatch, ImportError> {
        self.transition(ImportState::Parsing)?;
        match parser::parse(text, format) {
            Ok(records) if records.is_empty() => {
                self.fail(ImportError::Empty.to_string());
                Err(ImportError::Empty)
            }
            Ok(records) => Ok(ParsedBatch::new(records)),
            Err(e) => {
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Validates a parsed batch against `today`. Legal right after parsing, or
    /// from `Error` once a rejected batch has been corrected.
    ///
    /// A rejected batch comes back inside `ImportError::Invalid`.
    pub fn validate(
        &mut self,
        batch: ParsedBatch,
        today: NaiveDate,
    ) -> Result<ValidatedBatch, ImportError> {
        self.transition(ImportState::Validating)?;
        batch.validate(today).map_err(|failed| {
            self.fail(failed.to_string());
            ImportError::Invalid(Box::new(failed))
        })
    }

    pub fn validate_now(&mut self, batch: ParsedBatch) -> Result<ValidatedBatch, ImportError> {
        self.validate(batch, Utc::now().date_naive())
    }

    /// Runs the mass prediction for a validated batch.
    pub async fn predict<G>(
        &mut self,
        batch: &ValidatedBatch,
        gateway: &G,
    ) -> Result<BatchOutcome, ImportError>
    where
        G: PredictionGateway + ?Sized,
    {
        self.check(&ImportState::Predicting {
            completed: 0,
            total: batch.len(),
        })?;

        // The total is only known once the server's patients are in.
        let existing = match gateway.existing_candidates().await {
            Ok(existing) => existing,
            Err(e) => {
                self.fail(e.to_string());
                return Err(ImportError::Port(e));
            }
        };
        let candidates = batch.candidates(existing);
        self.set(ImportState::Predicting {
            completed: 0,
            total: candidates.len(),
        });

        let outcome = predict_candidates(gateway, candidates, |completed, total| {
            self.set(ImportState::Predicting { completed, total });
        })
        .await;

        self.set(ImportState::Done {
            succeeded: outcome.succeeded(),
            attempted: outcome.attempted,
        });
        Ok(outcome)
    }
}
