//! Router-level tests: route guard, handlers and error boundary, with the
//! remote API replaced by in-process fakes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use cardio_core::domain::{
    AuthResponse, DashboardMetrics, LoginRequest, MedicalHistory, MedicalRecord, MedicalValues,
    NewPatient, Patient, PatientPage, PredictionCandidate, PredictionResult, RegisterRequest,
    RemoteValidation, RiskLevel,
};
use cardio_core::ports::{AuthApi, ClinicalApi, PortError, PortResult, PredictionGateway};
use dashboard_lib::session::{MemoryStore, SessionManager, SessionStore};
use dashboard_lib::web::{build_router, AppState};
use dashboard_lib::Config;
use serde_json::{json, Value};
use tower::ServiceExt;

//=========================================================================================
// Fakes
//=========================================================================================

struct FakeAuth;

#[async_trait]
impl AuthApi for FakeAuth {
    async fn login(&self, request: &LoginRequest) -> PortResult<AuthResponse> {
        if request.password != "secret" {
            return Err(PortError::Unauthorized);
        }
        Ok(AuthResponse {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            user: json!({
                "id": 1, "email": request.email, "first_name": "Ana",
                "last_name": "Lopez", "role": "doctor", "is_active": true
            }),
        })
    }

    async fn register(&self, _request: &RegisterRequest) -> PortResult<AuthResponse> {
        Err(PortError::Rejected {
            status: 409,
            message: "exists".into(),
        })
    }

    async fn logout(&self, _refresh_token: &str) -> PortResult<()> {
        Ok(())
    }

    async fn refresh(&self, _refresh_token: &str) -> PortResult<String> {
        Ok("access".into())
    }
}

#[derive(Default)]
struct FakeClinical {
    explode: AtomicBool,
}

fn unsupported<T>() -> PortResult<T> {
    Err(PortError::Unexpected("not used by these tests".into()))
}

#[async_trait]
impl ClinicalApi for FakeClinical {
    async fn list_patients(&self, page: usize, page_size: usize) -> PortResult<PatientPage> {
        Ok(PatientPage {
            items: Vec::new(),
            total: 0,
            page,
            page_size,
        })
    }

    async fn all_patients(&self) -> PortResult<Vec<Patient>> {
        Ok(Vec::new())
    }

    async fn find_patient_by_dni(&self, _dni: &str) -> PortResult<Option<Patient>> {
        Ok(None)
    }

    async fn get_patient(&self, patient_id: &str) -> PortResult<Patient> {
        Err(PortError::NotFound(patient_id.to_string()))
    }

    async fn create_patient(&self, _patient: &NewPatient) -> PortResult<Patient> {
        unsupported()
    }

    async fn update_patient(&self, _id: &str, _patient: &NewPatient) -> PortResult<Patient> {
        unsupported()
    }

    async fn delete_patient(&self, _patient_id: &str) -> PortResult<()> {
        unsupported()
    }

    async fn medical_history(&self, _patient_id: &str) -> PortResult<MedicalHistory> {
        unsupported()
    }

    async fn create_record(
        &self,
        _patient_id: &str,
        _values: &MedicalValues,
    ) -> PortResult<MedicalRecord> {
        unsupported()
    }

    async fn update_record(
        &self,
        _record_id: &str,
        _values: &MedicalValues,
    ) -> PortResult<MedicalRecord> {
        unsupported()
    }

    async fn validate_medical_data(&self, _values: &MedicalValues) -> PortResult<RemoteValidation> {
        unsupported()
    }

    async fn prediction_history(&self, _patient_id: &str) -> PortResult<Vec<PredictionResult>> {
        Ok(Vec::new())
    }

    async fn get_prediction(&self, prediction_id: &str) -> PortResult<PredictionResult> {
        Err(PortError::NotFound(prediction_id.to_string()))
    }

    async fn dashboard_metrics(&self) -> PortResult<DashboardMetrics> {
        if self.explode.load(Ordering::SeqCst) {
            panic!("metrics view blew up");
        }
        Ok(DashboardMetrics {
            total_patients: 12,
            low_risk: 6,
            medium_risk: 4,
            high_risk: 2,
            predictions_today: 3,
            average_probability: 37.5,
        })
    }
}

/// Scores everyone except DNI 22222222, whose call fails.
struct FakePredictions;

#[async_trait]
impl PredictionGateway for FakePredictions {
    async fn existing_candidates(&self) -> PortResult<Vec<PredictionCandidate>> {
        Ok(Vec::new())
    }

    async fn predict(&self, candidate: &PredictionCandidate) -> PortResult<PredictionResult> {
        if candidate.patient.dni == "22222222" {
            return Err(PortError::Unavailable("model offline".into()));
        }
        Ok(PredictionResult {
            id: Some(format!("pred-{}", candidate.patient.dni)),
            patient_id: None,
            medical_record_id: None,
            probability: 42.0,
            risk_level: RiskLevel::Medium,
            factors: Vec::new(),
            recommendations: Vec::new(),
            created_at: None,
        })
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn gateway(clinical: Arc<FakeClinical>) -> (Router, Arc<AppState>) {
    let store = Arc::new(SessionStore::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
    ));
    let auth: Arc<dyn AuthApi> = Arc::new(FakeAuth);
    let state = Arc::new(AppState {
        config: Arc::new(Config::with_base_url("http://remote.invalid")),
        sessions: Arc::new(SessionManager::new(auth, store)),
        clinical,
        predictions: Arc::new(FakePredictions),
    });
    (build_router(state.clone()), state)
}

/// Signs the operator in and returns the cookie the browser would carry.
async fn sign_in(state: &AppState) -> String {
    state
        .sessions
        .login("ana@example.com", "secret", false)
        .await
        .unwrap();
    format!("auth_token={}", state.sessions.store().gateway_session().unwrap())
}

/// A router with a live session, and that session's cookie.
async fn signed_in_gateway(clinical: Arc<FakeClinical>) -> (Router, String) {
    let (app, state) = gateway(clinical);
    let cookie = sign_in(&state).await;
    (app, cookie)
}

fn upload(uri: &str, cookie: &str, file_name: &str, content: &str) -> Request<Body> {
    let boundary = "cardio-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
         Content-Type: text/csv\r\n\r\n{c}\r\n--{b}--\r\n",
        b = boundary,
        f = file_name,
        c = content
    );
    Request::post(uri)
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const BATCH: &str = "nombre,apellidos,dni,fecha_nacimiento,sexo,peso,altura\n\
                     Ana,Lopez,11111111,1975-03-15,F,62,160\n\
                     Luis,Gil,22222222,1980-01-01,M,80,175\n\
                     Eva,Ruiz,33333333,1990-05-05,F,58,165\n";

const INVALID_BATCH: &str = "nombre,apellidos,dni,fecha_nacimiento,sexo,peso,altura\n\
                             Ana,Lopez,123,1975-03-15,F,62,160\n";

//=========================================================================================
// Route guard
//=========================================================================================

#[tokio::test]
async fn protected_routes_redirect_to_login_without_a_cookie() {
    let (app, _) = gateway(Arc::default());

    let response = app
        .oneshot(Request::get("/dashboard").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn empty_cookie_counts_as_signed_out() {
    let (app, _) = gateway(Arc::default());

    let response = app
        .oneshot(
            Request::get("/patients")
                .header(header::COOKIE, "auth_token=; csrftoken=x")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn public_routes_need_no_session() {
    let (app, _) = gateway(Arc::default());

    let login = app
        .clone()
        .oneshot(Request::get("/login").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::OK);

    let docs = app
        .oneshot(
            Request::get("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(docs.status(), StatusCode::OK);
}

#[tokio::test]
async fn made_up_cookie_is_redirected_when_nobody_is_signed_in() {
    let (app, _) = gateway(Arc::default());

    let response = app.oneshot(get("/dashboard", "auth_token=abc")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn made_up_cookie_is_redirected_while_someone_else_is_signed_in() {
    let (app, _cookie) = signed_in_gateway(Arc::default()).await;

    let response = app
        .oneshot(get("/dashboard", "auth_token=abc; csrftoken=x"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn cookie_stops_working_after_logout() {
    let (app, state) = gateway(Arc::default());
    let cookie = sign_in(&state).await;

    let before = app.clone().oneshot(get("/dashboard", &cookie)).await.unwrap();
    assert_eq!(before.status(), StatusCode::OK);

    let logout = app
        .clone()
        .oneshot(
            Request::post("/auth/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);

    let after = app.oneshot(get("/dashboard", &cookie)).await.unwrap();
    assert_eq!(after.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn signed_in_operator_sees_the_dashboard() {
    let (app, cookie) = signed_in_gateway(Arc::default()).await;

    let response = app.oneshot(get("/dashboard", &cookie)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let metrics = body_json(response).await;
    assert_eq!(metrics["total_patients"], 12);
    assert_eq!(metrics["high_risk"], 2);
}

#[tokio::test]
async fn unknown_dni_is_not_found() {
    let (app, cookie) = signed_in_gateway(Arc::default()).await;

    let response = app.oneshot(get("/patients/99999999", &cookie)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

//=========================================================================================
// Auth
//=========================================================================================

#[tokio::test]
async fn login_sets_the_session_cookie() {
    let (app, state) = gateway(Arc::default());
    let body = json!({ "email": "ana@example.com", "password": "secret", "rememberMe": true });

    let response = app
        .oneshot(
            Request::post("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    let session_id = state.sessions.store().gateway_session().unwrap();
    assert!(cookie.starts_with(&format!("auth_token={};", session_id)));
    assert!(!cookie.contains("access"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age"));
    let signed_in = body_json(response).await;
    assert_eq!(signed_in["email"], "ana@example.com");
}

#[tokio::test]
async fn duplicate_registration_is_a_conflict() {
    let (app, _) = gateway(Arc::default());
    let body = json!({
        "email": "ana@example.com", "password": "secret",
        "first_name": "Ana", "last_name": "Lopez"
    });

    let response = app
        .oneshot(
            Request::post("/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "EMAIL_EXISTS");
}

//=========================================================================================
// Import
//=========================================================================================

#[tokio::test]
async fn import_reports_parsed_records() {
    let (app, cookie) = signed_in_gateway(Arc::default()).await;

    let response = app
        .oneshot(upload("/import", &cookie, "lote.csv", BATCH))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["valid"], true);
    assert_eq!(summary["records"][0]["bmi"], "24.22");
}

#[tokio::test]
async fn import_flags_invalid_records_without_failing() {
    let (app, cookie) = signed_in_gateway(Arc::default()).await;

    let response = app
        .oneshot(upload("/import", &cookie, "lote.csv", INVALID_BATCH))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["valid"], false);
    assert_eq!(summary["total"], 1);
}

#[tokio::test]
async fn unsupported_file_types_are_refused() {
    let (app, cookie) = signed_in_gateway(Arc::default()).await;

    let response = app
        .oneshot(upload("/import", &cookie, "lote.pdf", BATCH))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn mass_prediction_continues_past_failures() {
    let (app, cookie) = signed_in_gateway(Arc::default()).await;

    let response = app
        .oneshot(upload("/import/predict", &cookie, "lote.csv", BATCH))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["attempted"], 3);
    assert_eq!(summary["succeeded"], 2);
    assert_eq!(summary["outcome"]["failures"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn predicting_an_invalid_batch_returns_the_report_as_json() {
    let (app, cookie) = signed_in_gateway(Arc::default()).await;

    let response = app
        .oneshot(upload("/import/predict", &cookie, "lote.csv", INVALID_BATCH))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("application/json"));
    let report = body_json(response).await;
    assert_eq!(report["records"][0]["key"]["dni"], "123");
    assert!(!report["records"][0]["violations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn patients_export_is_a_csv_download() {
    let (app, cookie) = signed_in_gateway(Arc::default()).await;

    let response = app
        .oneshot(upload("/import/export?kind=patients", &cookie, "lote.csv", BATCH))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("pacientes.csv"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.contains("11111111"));
}

//=========================================================================================
// Error boundary
//=========================================================================================

#[tokio::test]
async fn a_panicking_view_renders_the_recovery_page() {
    let clinical = Arc::new(FakeClinical::default());
    clinical.explode.store(true, Ordering::SeqCst);
    let (app, cookie) = signed_in_gateway(clinical).await;

    let response = app.oneshot(get("/dashboard", &cookie)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key("x-correlation-id"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("Reintentar"));
}
