pub mod domain;
pub mod export;
pub mod import;
pub mod ports;
pub mod token;

pub use domain::{
    DashboardMetrics, MedicalHistory, MedicalRecord, MedicalValues, Patient, PatientPage,
    PredictionCandidate, PredictionResult, ProcessedPatient, RiskLevel, Session, User,
};
pub use import::{ImportError, ImportFormat, ImportPipeline, ImportState};
pub use ports::{AuthApi, ClinicalApi, PortError, PortResult, PredictionGateway};
