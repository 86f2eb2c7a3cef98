//! crates/cardio_core/src/ports.rs
//!
//! Defines the service contracts (traits) between the dashboard core and the
//! remote clinical API. The core never talks HTTP itself; the service crate
//! provides adapters for these ports.

use async_trait::async_trait;

use crate::domain::{
    AuthResponse, DashboardMetrics, LoginRequest, MedicalHistory, MedicalRecord, MedicalValues,
    NewPatient, Patient, PatientPage, PredictionCandidate, PredictionResult, RegisterRequest,
    RemoteValidation,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the transport-level errors of the concrete adapter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Session expired")]
    SessionExpired,
    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Remote service unavailable: {0}")]
    Unavailable(String),
    #[error("Request cancelled")]
    Cancelled,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> PortResult<AuthResponse>;

    async fn register(&self, request: &RegisterRequest) -> PortResult<AuthResponse>;

    /// Tells the server the refresh token is no longer in use.
    async fn logout(&self, refresh_token: &str) -> PortResult<()>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> PortResult<String>;
}

#[async_trait]
pub trait ClinicalApi: Send + Sync {
    // --- Patients ---
    async fn list_patients(&self, page: usize, page_size: usize) -> PortResult<PatientPage>;

    async fn all_patients(&self) -> PortResult<Vec<Patient>>;

    async fn find_patient_by_dni(&self, dni: &str) -> PortResult<Option<Patient>>;

    async fn get_patient(&self, patient_id: &str) -> PortResult<Patient>;

    async fn create_patient(&self, patient: &NewPatient) -> PortResult<Patient>;

    async fn update_patient(&self, patient_id: &str, patient: &NewPatient) -> PortResult<Patient>;

    async fn delete_patient(&self, patient_id: &str) -> PortResult<()>;

    async fn medical_history(&self, patient_id: &str) -> PortResult<MedicalHistory>;

    // --- Medical records ---
    async fn create_record(
        &self,
        patient_id: &str,
        values: &MedicalValues,
    ) -> PortResult<MedicalRecord>;

    async fn update_record(&self, record_id: &str, values: &MedicalValues)
        -> PortResult<MedicalRecord>;

    async fn validate_medical_data(&self, values: &MedicalValues) -> PortResult<RemoteValidation>;

    // --- Predictions and analytics ---
    async fn prediction_history(&self, patient_id: &str) -> PortResult<Vec<PredictionResult>>;

    async fn get_prediction(&self, prediction_id: &str) -> PortResult<PredictionResult>;

    async fn dashboard_metrics(&self) -> PortResult<DashboardMetrics>;
}

/// The two calls the bulk-prediction loop needs.
#[async_trait]
pub trait PredictionGateway: Send + Sync {
    /// Patients the server already knows about and that should be re-scored.
    async fn existing_candidates(&self) -> PortResult<Vec<PredictionCandidate>>;

    /// Scores one candidate.
    async fn predict(&self, candidate: &PredictionCandidate) -> PortResult<PredictionResult>;
}
