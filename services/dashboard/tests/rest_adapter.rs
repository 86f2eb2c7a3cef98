//! RestApi against a local fake of the clinical endpoints: record upsert
//! during bulk prediction and the existing-patient candidate set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use cardio_core::domain::{PredictionCandidate, ProcessedPatient, RiskLevel};
use cardio_core::ports::PredictionGateway;
use chrono::Utc;
use dashboard_lib::adapters::RestApi;
use dashboard_lib::http::{HttpClient, RateLimiter, ResponseCache, RetryPolicy};
use dashboard_lib::session::{MemoryStore, SessionStore};
use serde_json::{json, Value};

//=========================================================================================
// Fake clinical API
//=========================================================================================

#[derive(Default)]
struct Remote {
    /// Patients the server knows, by DNI.
    patients: Mutex<HashMap<String, Value>>,
    /// Medical records, by patient id.
    records: Mutex<HashMap<String, Vec<Value>>>,
    calls: Mutex<Vec<String>>,
    predict_bodies: Mutex<Vec<Value>>,
}

impl Remote {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn called(&self, call: &str) -> bool {
        self.calls().iter().any(|c| c == call)
    }
}

fn patient_json(id: &str, dni: &str) -> Value {
    json!({
        "id": id, "first_name": "Juan", "last_name": "Perez", "dni": dni,
        "birth_date": "1980-01-01", "sex": "M", "weight_kg": 80.0, "height_cm": 175.0
    })
}

fn record_json(id: &str, patient_id: &str, minutes_old: i64) -> Value {
    let created_at = Utc::now() - chrono::Duration::minutes(minutes_old);
    json!({
        "id": id, "patient_id": patient_id,
        "systolic_bp": 130.0, "diastolic_bp": 85.0, "total_cholesterol": 210.0,
        "hdl": 45.0, "ldl": 130.0, "triglycerides": 150.0, "glucose": 98.0, "hba1c": 5.6,
        "smoking": "no", "physical_activity": "moderada",
        "diabetes": false, "hypertension": true, "family_history": false,
        "created_at": created_at.to_rfc3339()
    })
}

async fn log_call(State(remote): State<Arc<Remote>>, req: Request, next: Next) -> Response {
    remote
        .calls
        .lock()
        .unwrap()
        .push(format!("{} {}", req.method(), req.uri().path()));
    next.run(req).await
}

async fn search(
    State(remote): State<Arc<Remote>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let dni = params.get("dni").cloned().unwrap_or_default();
    match remote.patients.lock().unwrap().get(&dni) {
        Some(patient) => Json(patient.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "detail": "No encontrado" }))).into_response(),
    }
}

async fn create_patient(State(remote): State<Arc<Remote>>, Json(body): Json<Value>) -> Response {
    let dni = body["dni"].as_str().unwrap_or_default().to_string();
    let created = patient_json("new-1", &dni);
    remote.patients.lock().unwrap().insert(dni, created.clone());
    (StatusCode::CREATED, Json(created)).into_response()
}

async fn history(State(remote): State<Arc<Remote>>, Path(id): Path<String>) -> Response {
    let patient = remote
        .patients
        .lock()
        .unwrap()
        .values()
        .find(|p| p["id"] == id.as_str())
        .cloned();
    let Some(patient) = patient else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let records = remote
        .records
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .unwrap_or_default();
    Json(json!({ "patient": patient, "records": records, "predictions": [] })).into_response()
}

async fn create_record(Json(body): Json<Value>) -> Response {
    let patient_id = body["patient"].as_str().unwrap_or_default().to_string();
    (StatusCode::CREATED, Json(record_json("rec-new", &patient_id, 0))).into_response()
}

async fn update_record(Path(id): Path<String>) -> Response {
    Json(record_json(&id, "7", 0)).into_response()
}

async fn predict(State(remote): State<Arc<Remote>>, Json(body): Json<Value>) -> Response {
    remote.predict_bodies.lock().unwrap().push(body.clone());
    Json(json!({
        "id": 501,
        "patient_id": body["patient_id"],
        "medical_record_id": body["medical_record_id"],
        "probability": 55.0,
        "risk_level": "Medio",
        "factors": ["Hipertensión"]
    }))
    .into_response()
}

async fn existing(State(remote): State<Arc<Remote>>) -> Response {
    let mut results = Vec::new();
    for patient in remote.patients.lock().unwrap().values() {
        let id = patient["id"].as_str().unwrap_or_default();
        let mut entry = patient.clone();
        entry["latest_record"] = record_json("r-latest", id, 10);
        results.push(entry);
    }
    Json(json!({ "count": results.len(), "results": results })).into_response()
}

async fn serve(remote: Arc<Remote>) -> String {
    let app = Router::new()
        .route("/patients/", post(create_patient))
        .route("/patients/search/", get(search))
        .route("/patients/{id}/history/", get(history))
        .route("/medical-records/", post(create_record))
        .route("/medical-records/{id}/", put(update_record))
        .route("/predictions/predict/", post(predict))
        .route("/predictions/patients/", get(existing))
        .layer(middleware::from_fn_with_state(remote.clone(), log_call))
        .with_state(remote);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

//=========================================================================================
// Wiring
//=========================================================================================

/// A remote that knows patient 7 (DNI 12345678) with one record of the given age.
fn remote_with_record(minutes_old: i64) -> Arc<Remote> {
    let remote = Arc::new(Remote::default());
    remote
        .patients
        .lock()
        .unwrap()
        .insert("12345678".into(), patient_json("7", "12345678"));
    remote
        .records
        .lock()
        .unwrap()
        .insert("7".into(), vec![record_json("r-old", "7", minutes_old)]);
    remote
}

async fn api(remote: Arc<Remote>) -> RestApi {
    let base = serve(remote).await;
    let store = Arc::new(SessionStore::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
    ));
    let client = Arc::new(HttpClient::new(
        base,
        store,
        Arc::new(RateLimiter::new(100, Duration::from_secs(60))),
        Arc::new(ResponseCache::new(Duration::from_secs(60))),
        RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
        Duration::from_secs(5),
    ));
    RestApi::new(client, Duration::from_secs(60 * 60))
}

fn imported(dni: &str) -> PredictionCandidate {
    PredictionCandidate::from(ProcessedPatient {
        first_name: "Juan".into(),
        last_name: "Perez".into(),
        dni: dni.into(),
        birth_date: "1980-01-01".into(),
        sex: "M".into(),
        weight: "80".into(),
        height: "175".into(),
        systolic_bp: "140".into(),
        hypertension: "si".into(),
        ..ProcessedPatient::default()
    })
}

//=========================================================================================
// Tests
//=========================================================================================

#[tokio::test]
async fn a_recent_record_is_updated_in_place() {
    let remote = remote_with_record(30);
    let api = api(remote.clone()).await;

    let prediction = api.predict(&imported("12345678")).await.unwrap();

    assert!(remote.called("PUT /medical-records/r-old/"));
    assert!(!remote.called("POST /medical-records/"));
    assert!(!remote.called("POST /patients/"));
    let body = remote.predict_bodies.lock().unwrap()[0].clone();
    assert_eq!(body["patient_id"], "7");
    assert_eq!(body["medical_record_id"], "r-old");
    assert_eq!(prediction.id.as_deref(), Some("501"));
    assert_eq!(prediction.risk_level, RiskLevel::Medium);
}

#[tokio::test]
async fn an_old_record_gets_a_new_one_alongside() {
    let remote = remote_with_record(90);
    let api = api(remote.clone()).await;

    api.predict(&imported("12345678")).await.unwrap();

    assert!(remote.called("POST /medical-records/"));
    assert!(!remote.called("PUT /medical-records/r-old/"));
    let body = remote.predict_bodies.lock().unwrap()[0].clone();
    assert_eq!(body["medical_record_id"], "rec-new");
}

#[tokio::test]
async fn an_unknown_dni_creates_the_patient_first() {
    let remote = Arc::new(Remote::default());
    let api = api(remote.clone()).await;

    let prediction = api.predict(&imported("87654321")).await.unwrap();

    assert_eq!(
        remote.calls(),
        vec![
            "GET /patients/search/",
            "POST /patients/",
            "GET /patients/new-1/history/",
            "POST /medical-records/",
            "POST /predictions/predict/",
        ]
    );
    assert_eq!(prediction.patient_id.as_deref(), Some("new-1"));
    assert_eq!(prediction.medical_record_id.as_deref(), Some("rec-new"));
}

#[tokio::test]
async fn server_patients_come_back_as_candidates_with_their_ids() {
    let remote = remote_with_record(90);
    let api = api(remote.clone()).await;

    let candidates = api.existing_candidates().await.unwrap();

    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];
    assert_eq!(candidate.patient_id.as_deref(), Some("7"));
    assert_eq!(candidate.patient.dni, "12345678");
    assert_eq!(candidate.patient.systolic_bp, "130");
    assert_eq!(candidate.patient.hypertension, "si");
    assert_eq!(candidate.patient.bmi, "26.12");

    // A candidate that already carries its id skips the DNI lookup.
    api.predict(candidate).await.unwrap();
    assert!(!remote.called("GET /patients/search/"));
    assert!(remote.called("GET /patients/7/history/"));
}
