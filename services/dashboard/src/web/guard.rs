//! services/dashboard/src/web/guard.rs
//!
//! Route guard: everything outside the public allow-list needs an
//! `auth_token` cookie holding the id of the live operator session,
//! otherwise the request is sent to the login view.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, warn};

use crate::session::cookies::{cookie_value, AUTH_COOKIE};
use crate::web::state::AppState;

pub const LOGIN_ROUTE: &str = "/login";

/// Path prefixes reachable without a session.
pub const PUBLIC_PREFIXES: [&str; 8] = [
    "/login",
    "/register",
    "/auth/",
    "/api/",
    "/static/",
    "/favicon.ico",
    "/swagger-ui",
    "/api-docs",
];

pub fn is_public(path: &str) -> bool {
    PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Every non-empty `auth_token` value the request carries.
pub fn auth_cookies(req: &Request) -> Vec<String> {
    req.headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookies| cookie_value(cookies, AUTH_COOKIE))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn require_session(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if is_public(&path) {
        return next.run(req).await;
    }
    let presented = auth_cookies(&req);
    let store = state.sessions.store();
    if presented.iter().any(|id| store.verify_gateway_session(id)) {
        return next.run(req).await;
    }
    if presented.is_empty() {
        debug!(path = %path, "No session cookie, redirecting to login");
    } else {
        warn!(path = %path, "Session cookie does not match the active session, redirecting to login");
    }
    Redirect::to(LOGIN_ROUTE).into_response()
}
