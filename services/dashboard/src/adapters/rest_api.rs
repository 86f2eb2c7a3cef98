//! services/dashboard/src/adapters/rest_api.rs
//!
//! The REST adapter: the concrete implementation of the `AuthApi`,
//! `ClinicalApi` and `PredictionGateway` ports from the core crate. Every call
//! goes through the shared `HttpClient` pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cardio_core::domain::{
    AuthResponse, DashboardMetrics, LoginRequest, MedicalHistory, MedicalRecord, MedicalValues,
    NewPatient, Patient, PatientPage, PredictionCandidate, PredictionResult, ProcessedPatient,
    RegisterRequest, RemoteValidation,
};
use cardio_core::import::parser::compute_bmi;
use cardio_core::ports::{AuthApi, ClinicalApi, PortError, PortResult, PredictionGateway};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http::{ApiRequest, HttpClient, HttpError};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct RestApi {
    client: Arc<HttpClient>,
    /// A patient's latest record younger than this is updated in place.
    recent_record_window: Duration,
}

impl RestApi {
    pub fn new(client: Arc<HttpClient>, recent_record_window: Duration) -> Self {
        Self {
            client,
            recent_record_window,
        }
    }

    pub fn client(&self) -> &Arc<HttpClient> {
        &self.client
    }

    /// Finds or creates the patient, upserts its medical record and returns
    /// `(patient_id, record_id)`.
    async fn upsert_for_prediction(
        &self,
        candidate: &PredictionCandidate,
    ) -> PortResult<(String, String)> {
        let staged = &candidate.patient;
        let patient_id = match &candidate.patient_id {
            Some(id) => id.clone(),
            None => match self.find_patient_by_dni(&staged.dni).await? {
                Some(existing) => existing.id,
                None => {
                    let created = self.create_patient(&new_patient_from(staged)?).await?;
                    info!(dni = %staged.dni, patient_id = %created.id, "Created patient from import");
                    created.id
                }
            },
        };

        let values = values_from(staged);
        let history = self.medical_history(&patient_id).await?;
        let record = match history.latest_record() {
            Some(latest) if self.is_recent(latest) => {
                debug!(record_id = %latest.id, "Updating recent medical record in place");
                self.update_record(&latest.id, &values).await?
            }
            _ => self.create_record(&patient_id, &values).await?,
        };
        Ok((patient_id, record.id))
    }

    fn is_recent(&self, record: &MedicalRecord) -> bool {
        let Ok(window) = chrono::Duration::from_std(self.recent_record_window) else {
            return false;
        };
        Utc::now().signed_duration_since(record.created_at) < window
    }
}

//=========================================================================================
// "Impure" Wire Structs
//=========================================================================================

#[derive(Deserialize)]
struct PageRecord<T> {
    #[serde(alias = "count")]
    total: usize,
    #[serde(alias = "results")]
    items: Vec<T>,
}

/// Listing endpoints answer either with a bare array or with a page.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListRecord<T> {
    Plain(Vec<T>),
    Paged(PageRecord<T>),
}
impl<T> ListRecord<T> {
    fn to_domain(self) -> Vec<T> {
        match self {
            Self::Plain(items) => items,
            Self::Paged(page) => page.items,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchRecord {
    One(Patient),
    Many(ListRecord<Patient>),
}

#[derive(Deserialize)]
struct ExistingPatientRecord {
    #[serde(flatten)]
    patient: Patient,
    #[serde(default)]
    latest_record: Option<MedicalRecord>,
}
impl ExistingPatientRecord {
    fn to_domain(self) -> PredictionCandidate {
        PredictionCandidate {
            patient_id: Some(self.patient.id.clone()),
            patient: staged_from(&self.patient, self.latest_record.as_ref()),
        }
    }
}

#[derive(Deserialize)]
struct RefreshRecord {
    #[serde(alias = "access_token")]
    access: String,
}

#[derive(Serialize)]
struct RecordPayload<'a> {
    patient: &'a str,
    #[serde(flatten)]
    values: &'a MedicalValues,
}

#[derive(Serialize)]
struct PredictPayload<'a> {
    patient_id: &'a str,
    medical_record_id: &'a str,
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl AuthApi for RestApi {
    async fn login(&self, request: &LoginRequest) -> PortResult<AuthResponse> {
        Ok(self
            .client
            .json(ApiRequest::post("/auth/login/").json(request))
            .await?)
    }

    async fn register(&self, request: &RegisterRequest) -> PortResult<AuthResponse> {
        Ok(self
            .client
            .json(ApiRequest::post("/auth/register/").json(request))
            .await?)
    }

    async fn logout(&self, refresh_token: &str) -> PortResult<()> {
        self.client
            .send(ApiRequest::post("/auth/logout/").json(&serde_json::json!({ "refresh": refresh_token })))
            .await?;
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> PortResult<String> {
        let record: RefreshRecord = self
            .client
            .json(ApiRequest::post("/auth/refresh/").json(&serde_json::json!({ "refresh": refresh_token })))
            .await?;
        Ok(record.access)
    }
}

#[async_trait]
impl ClinicalApi for RestApi {
    async fn list_patients(&self, page: usize, page_size: usize) -> PortResult<PatientPage> {
        let request = ApiRequest::get("/patients/")
            .query("page", page)
            .query("page_size", page_size);
        let record: PageRecord<Patient> = self.client.json(request).await?;
        Ok(PatientPage {
            items: record.items,
            total: record.total,
            page,
            page_size,
        })
    }

    async fn all_patients(&self) -> PortResult<Vec<Patient>> {
        let record: ListRecord<Patient> = self.client.json(ApiRequest::get("/patients/")).await?;
        Ok(record.to_domain())
    }

    async fn find_patient_by_dni(&self, dni: &str) -> PortResult<Option<Patient>> {
        let request = ApiRequest::get("/patients/search/").query("dni", dni);
        match self.client.json::<SearchRecord>(request).await {
            Ok(SearchRecord::One(patient)) => Ok(Some(patient)),
            Ok(SearchRecord::Many(list)) => Ok(list
                .to_domain()
                .into_iter()
                .find(|p| p.dni.eq_ignore_ascii_case(dni))),
            Err(HttpError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_patient(&self, patient_id: &str) -> PortResult<Patient> {
        Ok(self
            .client
            .json(ApiRequest::get(format!("/patients/{}/", patient_id)))
            .await?)
    }

    async fn create_patient(&self, patient: &NewPatient) -> PortResult<Patient> {
        Ok(self
            .client
            .json(ApiRequest::post("/patients/").json(patient))
            .await?)
    }

    async fn update_patient(&self, patient_id: &str, patient: &NewPatient) -> PortResult<Patient> {
        Ok(self
            .client
            .json(ApiRequest::put(format!("/patients/{}/", patient_id)).json(patient))
            .await?)
    }

    async fn delete_patient(&self, patient_id: &str) -> PortResult<()> {
        self.client
            .send(ApiRequest::delete(format!("/patients/{}/", patient_id)))
            .await?;
        Ok(())
    }

    async fn medical_history(&self, patient_id: &str) -> PortResult<MedicalHistory> {
        Ok(self
            .client
            .json(ApiRequest::get(format!("/patients/{}/history/", patient_id)))
            .await?)
    }

    async fn create_record(
        &self,
        patient_id: &str,
        values: &MedicalValues,
    ) -> PortResult<MedicalRecord> {
        let payload = RecordPayload {
            patient: patient_id,
            values,
        };
        Ok(self
            .client
            .json(ApiRequest::post("/medical-records/").json(&payload))
            .await?)
    }

    async fn update_record(
        &self,
        record_id: &str,
        values: &MedicalValues,
    ) -> PortResult<MedicalRecord> {
        Ok(self
            .client
            .json(ApiRequest::put(format!("/medical-records/{}/", record_id)).json(values))
            .await?)
    }

    async fn validate_medical_data(&self, values: &MedicalValues) -> PortResult<RemoteValidation> {
        Ok(self
            .client
            .json(ApiRequest::post("/medical-data/validate/").json(values))
            .await?)
    }

    async fn prediction_history(&self, patient_id: &str) -> PortResult<Vec<PredictionResult>> {
        let record: ListRecord<PredictionResult> = self
            .client
            .json(ApiRequest::get(format!("/predictions/history/{}/", patient_id)))
            .await?;
        Ok(record.to_domain())
    }

    async fn get_prediction(&self, prediction_id: &str) -> PortResult<PredictionResult> {
        Ok(self
            .client
            .json(ApiRequest::get(format!("/predictions/{}/", prediction_id)))
            .await?)
    }

    async fn dashboard_metrics(&self) -> PortResult<DashboardMetrics> {
        Ok(self
            .client
            .json(ApiRequest::get("/analytics/dashboard/"))
            .await?)
    }
}

#[async_trait]
impl PredictionGateway for RestApi {
    async fn existing_candidates(&self) -> PortResult<Vec<PredictionCandidate>> {
        let record: ListRecord<ExistingPatientRecord> = self
            .client
            .json(ApiRequest::get("/predictions/patients/"))
            .await?;
        Ok(record
            .to_domain()
            .into_iter()
            .map(ExistingPatientRecord::to_domain)
            .collect())
    }

    async fn predict(&self, candidate: &PredictionCandidate) -> PortResult<PredictionResult> {
        let (patient_id, record_id) = self.upsert_for_prediction(candidate).await?;
        let payload = PredictPayload {
            patient_id: &patient_id,
            medical_record_id: &record_id,
        };
        Ok(self
            .client
            .json(ApiRequest::post("/predictions/predict/").json(&payload))
            .await?)
    }
}

//=========================================================================================
// Staged record conversions
//=========================================================================================

fn number(raw: &str) -> f64 {
    raw.trim().replace(',', ".").parse().unwrap_or(0.0)
}

fn flag(raw: &str) -> bool {
    matches!(raw.trim(), "si" | "sí" | "true" | "1")
}

fn new_patient_from(staged: &ProcessedPatient) -> PortResult<NewPatient> {
    let birth_date = NaiveDate::parse_from_str(&staged.birth_date, "%Y-%m-%d").map_err(|_| {
        PortError::Unexpected(format!(
            "invalid birth date '{}' for {}",
            staged.birth_date, staged.dni
        ))
    })?;
    let height = number(&staged.height);
    Ok(NewPatient {
        first_name: staged.first_name.clone(),
        last_name: staged.last_name.clone(),
        dni: staged.dni.clone(),
        birth_date,
        sex: staged.sex.clone(),
        weight_kg: number(&staged.weight),
        height_cm: if height < 3.0 { height * 100.0 } else { height },
    })
}

fn values_from(staged: &ProcessedPatient) -> MedicalValues {
    MedicalValues {
        systolic_bp: number(&staged.systolic_bp),
        diastolic_bp: number(&staged.diastolic_bp),
        total_cholesterol: number(&staged.total_cholesterol),
        hdl: number(&staged.hdl),
        ldl: number(&staged.ldl),
        triglycerides: number(&staged.triglycerides),
        glucose: number(&staged.glucose),
        hba1c: number(&staged.hba1c),
        smoking: staged.smoking.clone(),
        physical_activity: staged.physical_activity.clone(),
        diabetes: flag(&staged.diabetes),
        hypertension: flag(&staged.hypertension),
        family_history: flag(&staged.family_history),
    }
}

/// Stages a server-known patient so it can be re-scored with the batch.
fn staged_from(patient: &Patient, record: Option<&MedicalRecord>) -> ProcessedPatient {
    let yes_no = |b: bool| (if b { "si" } else { "no" }).to_string();
    let weight = patient.weight_kg.to_string();
    let height = patient.height_cm.to_string();
    let mut staged = ProcessedPatient {
        first_name: patient.first_name.clone(),
        last_name: patient.last_name.clone(),
        dni: patient.dni.clone(),
        birth_date: patient.birth_date.format("%Y-%m-%d").to_string(),
        sex: patient.sex.clone(),
        bmi: compute_bmi(&weight, &height).unwrap_or_else(|| "0".to_string()),
        weight,
        height,
        risk: patient
            .current_risk
            .map(|r| r.label().to_string())
            .unwrap_or_default(),
        ..ProcessedPatient::default()
    };
    match record {
        Some(record) => {
            let v = &record.values;
            staged.systolic_bp = v.systolic_bp.to_string();
            staged.diastolic_bp = v.diastolic_bp.to_string();
            staged.total_cholesterol = v.total_cholesterol.to_string();
            staged.hdl = v.hdl.to_string();
            staged.ldl = v.ldl.to_string();
            staged.triglycerides = v.triglycerides.to_string();
            staged.glucose = v.glucose.to_string();
            staged.hba1c = v.hba1c.to_string();
            staged.smoking = v.smoking.clone();
            staged.physical_activity = v.physical_activity.clone();
            staged.diabetes = yes_no(v.diabetes);
            staged.hypertension = yes_no(v.hypertension);
            staged.family_history = yes_no(v.family_history);
            staged.record_date = record.created_at.format("%Y-%m-%d").to_string();
        }
        None => {
            for field in [
                &mut staged.systolic_bp,
                &mut staged.diastolic_bp,
                &mut staged.total_cholesterol,
                &mut staged.hdl,
                &mut staged.ldl,
                &mut staged.triglycerides,
                &mut staged.glucose,
                &mut staged.hba1c,
            ] {
                *field = "0".to_string();
            }
            staged.smoking = "no".to_string();
            staged.physical_activity = "sedentario".to_string();
            staged.diabetes = "no".to_string();
            staged.hypertension = "no".to_string();
            staged.family_history = "no".to_string();
        }
    }
    staged
}
