//! services/dashboard/src/web/rest.rs
//!
//! Contains the Axum handlers for the dashboard views and the bulk import,
//! and the master definition for the OpenAPI specification.

use crate::error::port_error_response;
use crate::web::auth::{self, AuthFailure, LoginForm, RegisterForm, SignedIn};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use cardio_core::domain::ProcessedPatient;
use cardio_core::export::{patients_to_csv, predictions_to_csv};
use cardio_core::import::{
    BatchOutcome, ImportError, ImportFormat, ImportPipeline, ImportState, ParsedBatch,
    ValidationReport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::register_handler,
        auth::logout_handler,
        auth::login_page,
        dashboard_handler,
        list_patients_handler,
        patient_history_handler,
        import_handler,
        import_predict_handler,
        import_export_handler,
    ),
    components(
        schemas(LoginForm, RegisterForm, SignedIn, AuthFailure, ImportSummary, PredictionSummary)
    ),
    tags(
        (name = "Cardio Dashboard", description = "Gateway for the cardiovascular-risk dashboard.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, IntoParams)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

#[derive(Deserialize, IntoParams)]
pub struct ExportParams {
    /// `predictions` (default) or `patients`.
    #[serde(default)]
    pub kind: ExportKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    #[default]
    Predictions,
    Patients,
}

/// Result of parsing and validating an upload.
#[derive(Serialize, ToSchema)]
pub struct ImportSummary {
    pub file_name: String,
    #[schema(value_type = Object)]
    pub state: ImportState,
    pub total: usize,
    pub valid: bool,
    #[schema(value_type = Vec<Object>)]
    pub records: Vec<ProcessedPatient>,
    #[schema(value_type = Object)]
    pub report: ValidationReport,
}

/// Result of a mass prediction run.
#[derive(Serialize, ToSchema)]
pub struct PredictionSummary {
    #[schema(value_type = Object)]
    pub state: ImportState,
    pub attempted: usize,
    pub succeeded: usize,
    #[schema(value_type = Object)]
    pub outcome: BatchOutcome,
}

/// Handler failure: a status with a message, or a batch that failed
/// validation, which goes back as its JSON report.
#[derive(Debug)]
pub enum HandlerError {
    Message(StatusCode, String),
    Invalid(ValidationReport),
}

impl From<(StatusCode, String)> for HandlerError {
    fn from((status, message): (StatusCode, String)) -> Self {
        Self::Message(status, message)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            Self::Message(status, message) => (status, message).into_response(),
            Self::Invalid(report) => (StatusCode::UNPROCESSABLE_ENTITY, Json(report)).into_response(),
        }
    }
}

fn import_error_response(err: &ImportError) -> (StatusCode, String) {
    match err {
        ImportError::UnsupportedFormat(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, err.to_string()),
        ImportError::Port(e) => port_error_response(e),
        ImportError::IllegalTransition { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        _ => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
    }
}

/// Reads the first file part of a multipart upload as UTF-8 text.
async fn read_upload(multipart: &mut Multipart) -> Result<(String, String), HandlerError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read file bytes: {}", e),
            )
        })?;
        let text = String::from_utf8(data.to_vec()).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Uploaded file is not valid UTF-8 text: {}", e),
            )
        })?;
        return Ok((name, text));
    }
    Err((
        StatusCode::BAD_REQUEST,
        "Multipart form must include a file".to_string(),
    )
        .into())
}

fn logging_pipeline(file_name: &str) -> ImportPipeline {
    let file_name = file_name.to_string();
    ImportPipeline::with_observer(move |state| {
        info!(file = %file_name, state = state.name(), progress = state.progress_percent(), "Import progress");
    })
}

fn parse_upload(
    pipeline: &mut ImportPipeline,
    file_name: &str,
    text: &str,
) -> Result<ParsedBatch, HandlerError> {
    let format = ImportFormat::from_file_name(file_name).map_err(|e| import_error_response(&e))?;
    Ok(pipeline
        .parse(text, format)
        .map_err(|e| import_error_response(&e))?)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Aggregated risk metrics for the landing view.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard metrics"),
        (status = 303, description = "No session; redirected to /login"),
        (status = 502, description = "Remote API unavailable")
    )
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let metrics = state.clinical.dashboard_metrics().await.map_err(|e| {
        error!("Failed to load dashboard metrics: {}", e);
        port_error_response(&e)
    })?;
    Ok(Json(metrics))
}

/// One page of the patient listing.
#[utoipa::path(
    get,
    path = "/patients",
    params(PageParams),
    responses(
        (status = 200, description = "A page of patients"),
        (status = 303, description = "No session; redirected to /login")
    )
)]
pub async fn list_patients_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, HandlerError> {
    let page = state
        .clinical
        .list_patients(params.page.max(1), params.page_size.clamp(1, 100))
        .await
        .map_err(|e| port_error_response(&e))?;
    Ok(Json(page))
}

/// A patient's records and predictions, looked up by DNI.
#[utoipa::path(
    get,
    path = "/patients/{dni}",
    params(
        ("dni" = String, Path, description = "National ID of the patient.")
    ),
    responses(
        (status = 200, description = "Medical history"),
        (status = 404, description = "No patient with this DNI")
    )
)]
pub async fn patient_history_handler(
    State(state): State<Arc<AppState>>,
    Path(dni): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let patient = state
        .clinical
        .find_patient_by_dni(&dni)
        .await
        .map_err(|e| port_error_response(&e))?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("No existe un paciente con DNI {}", dni),
            )
        })?;
    let history = state
        .clinical
        .medical_history(&patient.id)
        .await
        .map_err(|e| port_error_response(&e))?;
    Ok(Json(history))
}

/// Parse and validate an uploaded CSV/JSON file.
///
/// Always answers with the full validation report; `valid` tells whether the
/// batch can go on to prediction.
#[utoipa::path(
    post,
    path = "/import",
    request_body(content_type = "multipart/form-data", description = "The .csv, .txt or .json file to import."),
    responses(
        (status = 200, description = "Parsed records and validation report", body = ImportSummary),
        (status = 415, description = "Unsupported file type"),
        (status = 422, description = "The file could not be parsed")
    )
)]
pub async fn import_handler(
    State(_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let (file_name, text) = read_upload(&mut multipart).await?;
    let mut pipeline = logging_pipeline(&file_name);
    let batch = parse_upload(&mut pipeline, &file_name, &text)?;

    let (records, report, valid) = match pipeline.validate_now(batch) {
        Ok(validated) => (validated.records().to_vec(), ValidationReport::default(), true),
        Err(ImportError::Invalid(failed)) => {
            let failed = *failed;
            (failed.batch.into_records(), failed.report, false)
        }
        Err(e) => return Err(import_error_response(&e).into()),
    };
    Ok(Json(ImportSummary {
        file_name,
        state: pipeline.state().clone(),
        total: records.len(),
        valid,
        records,
        report,
    }))
}

/// Import a file and run the mass prediction over it.
///
/// Patients the server already knows are re-scored first. Records whose
/// prediction fails are listed in `outcome.failures` without stopping the run.
#[utoipa::path(
    post,
    path = "/import/predict",
    request_body(content_type = "multipart/form-data", description = "The file to import and score."),
    responses(
        (status = 200, description = "Prediction outcome", body = PredictionSummary),
        (status = 422, description = "The file failed parsing or validation")
    )
)]
pub async fn import_predict_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let (file_name, text) = read_upload(&mut multipart).await?;
    let (pipeline, outcome) = run_prediction(&state, &file_name, &text).await?;
    Ok(Json(PredictionSummary {
        state: pipeline.state().clone(),
        attempted: outcome.attempted,
        succeeded: outcome.succeeded(),
        outcome,
    }))
}

/// Import a file and download either the normalized patients or their
/// predictions as CSV.
#[utoipa::path(
    post,
    path = "/import/export",
    params(ExportParams),
    request_body(content_type = "multipart/form-data", description = "The file to import."),
    responses(
        (status = 200, description = "CSV download", body = String, content_type = "text/csv"),
        (status = 422, description = "The file failed parsing or validation")
    )
)]
pub async fn import_export_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let (file_name, text) = read_upload(&mut multipart).await?;
    let (csv, download) = match params.kind {
        ExportKind::Patients => {
            let mut pipeline = logging_pipeline(&file_name);
            let batch = parse_upload(&mut pipeline, &file_name, &text)?;
            (patients_to_csv(batch.records()), "pacientes.csv")
        }
        ExportKind::Predictions => {
            let (_, outcome) = run_prediction(&state, &file_name, &text).await?;
            (predictions_to_csv(&outcome.results), "predicciones.csv")
        }
    };
    let csv = csv.map_err(|e| {
        error!("CSV export failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download),
            ),
        ],
        csv,
    ))
}

async fn run_prediction(
    state: &AppState,
    file_name: &str,
    text: &str,
) -> Result<(ImportPipeline, BatchOutcome), HandlerError> {
    let mut pipeline = logging_pipeline(file_name);
    let batch = parse_upload(&mut pipeline, file_name, text)?;
    let validated = pipeline.validate_now(batch).map_err(|e| match e {
        ImportError::Invalid(failed) => HandlerError::Invalid(failed.report),
        other => import_error_response(&other).into(),
    })?;
    let outcome = pipeline
        .predict(&validated, state.predictions.as_ref())
        .await
        .map_err(|e| {
            error!("Mass prediction aborted: {}", e);
            import_error_response(&e)
        })?;
    Ok((pipeline, outcome))
}
