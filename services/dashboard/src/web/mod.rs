pub mod auth;
pub mod boundary;
pub mod guard;
pub mod rest;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use guard::require_session;
pub use rest::ApiDoc;
pub use state::AppState;

/// Upload ceiling for import files.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// The complete gateway: routes, route guard, error boundary and Swagger UI.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/login", get(auth::login_page))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/dashboard", get(rest::dashboard_handler))
        .route("/patients", get(rest::list_patients_handler))
        .route("/patients/{dni}", get(rest::patient_history_handler))
        .route("/import", post(rest::import_handler))
        .route("/import/predict", post(rest::import_predict_handler))
        .route("/import/export", post(rest::import_export_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state.clone());

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum_middleware::from_fn_with_state(app_state, require_session))
        .layer(CatchPanicLayer::custom(boundary::recovery_page))
}
