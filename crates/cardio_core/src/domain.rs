//! crates/cardio_core/src/domain.rs
//!
//! Defines the core data structures shared by the dashboard.
//! The remote API owns every one of these records; the dashboard only caches
//! them per view, so they derive `Serialize`/`Deserialize` for the wire.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

//=========================================================================================
// Authentication
//=========================================================================================

/// The authenticated clinician, as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub is_active: bool,
}

/// An operator session: the token pair plus the user it belongs to.
///
/// A session is only usable while the access token is unexpired, or while the
/// refresh token can still mint a new access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
    pub remember_me: bool,
}

/// Payload sent to the login endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Payload sent to the registration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Raw token response. The user is left untyped so its shape can be checked
/// before it is accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(alias = "access")]
    pub access_token: String,
    #[serde(alias = "refresh")]
    pub refresh_token: String,
    pub user: serde_json::Value,
}

//=========================================================================================
// Clinical records
//=========================================================================================

/// Discrete cardiovascular risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(alias = "Bajo", alias = "LOW", alias = "low")]
    Low,
    #[serde(alias = "Medio", alias = "MEDIUM", alias = "medium", alias = "Moderate")]
    Medium,
    #[serde(alias = "Alto", alias = "HIGH", alias = "high")]
    High,
}

impl RiskLevel {
    /// Band for a probability expressed as a percentage (0-100).
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability < 30.0 {
            Self::Low
        } else if probability < 70.0 {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Spanish label used in exports and in imported files.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Bajo",
            Self::Medium => "Medio",
            Self::High => "Alto",
        }
    }

    /// Parses either the Spanish or the English spelling.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "bajo" | "low" => Some(Self::Low),
            "medio" | "medium" | "moderado" | "moderate" => Some(Self::Medium),
            "alto" | "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A registered patient. `current_risk` is denormalized from the latest prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub dni: String,
    pub birth_date: NaiveDate,
    pub sex: String,
    pub weight_kg: f64,
    pub height_cm: f64,
    #[serde(default)]
    pub current_risk: Option<RiskLevel>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload used to create or update a patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub dni: String,
    pub birth_date: NaiveDate,
    pub sex: String,
    pub weight_kg: f64,
    pub height_cm: f64,
}

/// Vitals, lab values and lifestyle factors captured for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecord {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "de::string_or_number")]
    pub patient_id: String,
    #[serde(flatten)]
    pub values: MedicalValues,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The measurable part of a medical record, shared by create/update payloads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MedicalValues {
    pub systolic_bp: f64,
    pub diastolic_bp: f64,
    pub total_cholesterol: f64,
    pub hdl: f64,
    pub ldl: f64,
    pub triglycerides: f64,
    pub glucose: f64,
    pub hba1c: f64,
    pub smoking: String,
    pub physical_activity: String,
    pub diabetes: bool,
    pub hypertension: bool,
    pub family_history: bool,
}

/// Output of the remote risk model. Never edited once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub patient_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub medical_record_id: Option<String>,
    /// Percentage in `[0, 100]`.
    pub probability: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub factors: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A patient together with everything recorded about them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalHistory {
    pub patient: Patient,
    #[serde(default)]
    pub records: Vec<MedicalRecord>,
    #[serde(default)]
    pub predictions: Vec<PredictionResult>,
}

impl MedicalHistory {
    /// The most recently created record, if any.
    pub fn latest_record(&self) -> Option<&MedicalRecord> {
        self.records.iter().max_by_key(|r| r.created_at)
    }
}

/// One page of the patient listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientPage {
    pub items: Vec<Patient>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

impl PatientPage {
    pub fn has_more(&self) -> bool {
        self.page * self.page_size < self.total
    }
}

/// Aggregates shown on the dashboard landing view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_patients: u64,
    pub low_risk: u64,
    pub medium_risk: u64,
    pub high_risk: u64,
    pub predictions_today: u64,
    pub average_probability: f64,
}

/// Server verdict on a block of medical data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteValidation {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

//=========================================================================================
// Import staging
//=========================================================================================

/// Loosely-typed, string-valued staging record produced by the import parser.
///
/// Never persisted: it only drives validation, bulk prediction and export.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessedPatient {
    pub first_name: String,
    pub last_name: String,
    pub dni: String,
    pub birth_date: String,
    pub sex: String,
    pub weight: String,
    pub height: String,
    pub bmi: String,
    pub systolic_bp: String,
    pub diastolic_bp: String,
    pub total_cholesterol: String,
    pub hdl: String,
    pub ldl: String,
    pub triglycerides: String,
    pub glucose: String,
    pub hba1c: String,
    pub smoking: String,
    pub physical_activity: String,
    pub diabetes: String,
    pub hypertension: String,
    pub family_history: String,
    pub risk: String,
    pub clinical_history: String,
    pub record_date: String,
}

impl ProcessedPatient {
    /// "First Last", used for logging and report keys.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// A row handed to the prediction loop. Rows coming from the server carry
/// their patient id; freshly imported rows do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionCandidate {
    pub patient: ProcessedPatient,
    #[serde(default)]
    pub patient_id: Option<String>,
}

impl From<ProcessedPatient> for PredictionCandidate {
    fn from(patient: ProcessedPatient) -> Self {
        Self {
            patient,
            patient_id: None,
        }
    }
}

/// Serde helpers for ids that some endpoints send as numbers.
mod de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        S(String),
        N(serde_json::Number),
    }

    impl From<StringOrNumber> for String {
        fn from(v: StringOrNumber) -> Self {
            match v {
                StringOrNumber::S(s) => s,
                StringOrNumber::N(n) => n.to_string(),
            }
        }
    }

    pub fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        StringOrNumber::deserialize(d).map(String::from)
    }

    pub fn opt_string_or_number<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<String>, D::Error> {
        Option::<StringOrNumber>::deserialize(d).map(|v| v.map(String::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_from_probability() {
        assert_eq!(RiskLevel::from_probability(10.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(30.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(69.9), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(85.0), RiskLevel::High);
    }

    #[test]
    fn risk_level_accepts_both_languages() {
        assert_eq!(RiskLevel::parse("Alto"), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse(" low "), Some(RiskLevel::Low));
        assert_eq!(RiskLevel::parse("unknown"), None);
        let parsed: RiskLevel = serde_json::from_str("\"Medio\"").unwrap();
        assert_eq!(parsed, RiskLevel::Medium);
    }

    #[test]
    fn prediction_accepts_numeric_ids() {
        let json = r#"{"id": 7, "patient_id": "12", "probability": 42.5,
                       "risk_level": "Medium", "factors": ["Tabaquismo"]}"#;
        let p: PredictionResult = serde_json::from_str(json).unwrap();
        assert_eq!(p.id.as_deref(), Some("7"));
        assert_eq!(p.patient_id.as_deref(), Some("12"));
        assert!(p.medical_record_id.is_none());
        assert!(p.recommendations.is_empty());
    }

    #[test]
    fn page_reports_remaining_items() {
        let page = PatientPage {
            items: vec![],
            total: 45,
            page: 2,
            page_size: 20,
        };
        assert!(page.has_more());
        let last = PatientPage { page: 3, ..page };
        assert!(!last.has_more());
    }
}
