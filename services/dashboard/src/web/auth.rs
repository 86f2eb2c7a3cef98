//! services/dashboard/src/web/auth.rs
//!
//! Authentication endpoints: login, registration and logout. A successful
//! sign-in hands the browser the session's opaque gateway id in the
//! `auth_token` cookie; the route guard checks it against the live session.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use cardio_core::domain::{RegisterRequest, Session};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::session::cookies::AUTH_COOKIE;
use crate::session::{AuthError, AuthErrorCode};
use crate::web::state::AppState;

/// Lifetime of the cookie of a "remember me" session (the refresh token's).
const REMEMBER_ME_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(default, alias = "rememberMe")]
    pub remember_me: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, alias = "rememberMe")]
    pub remember_me: bool,
}

#[derive(Serialize, ToSchema)]
pub struct SignedIn {
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub remember_me: bool,
}

impl From<&Session> for SignedIn {
    fn from(session: &Session) -> Self {
        let user = &session.user;
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            full_name: format!("{} {}", user.first_name, user.last_name)
                .trim()
                .to_string(),
            role: user.role.clone(),
            remember_me: session.remember_me,
        }
    }
}

/// Machine-readable failure sent back to the login view.
#[derive(Serialize, ToSchema)]
pub struct AuthFailure {
    pub code: String,
    pub message: String,
}

fn auth_failure(err: AuthError) -> (StatusCode, Json<AuthFailure>) {
    let status = match err.code {
        AuthErrorCode::EmailExists => StatusCode::CONFLICT,
        AuthErrorCode::SessionExpired => StatusCode::UNAUTHORIZED,
        AuthErrorCode::ServerError(s) if (400..500).contains(&s) => {
            StatusCode::from_u16(s).unwrap_or(StatusCode::BAD_REQUEST)
        }
        AuthErrorCode::ServerError(_) | AuthErrorCode::InvalidUserData => StatusCode::BAD_GATEWAY,
        AuthErrorCode::Generic => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(AuthFailure {
            code: err.code.to_string(),
            message: err.message,
        }),
    )
}

fn session_cookie(session_id: &str, remember_me: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/",
        AUTH_COOKIE, session_id
    );
    if remember_me {
        cookie.push_str(&format!("; Max-Age={}", REMEMBER_ME_MAX_AGE_SECS));
    }
    cookie
}

/// Cookie for the session that was just stored.
fn issue_cookie(
    state: &AppState,
    session: &Session,
) -> Result<String, (StatusCode, Json<AuthFailure>)> {
    match state.sessions.store().gateway_session() {
        Some(id) => Ok(session_cookie(&id, session.remember_me)),
        None => {
            error!("Session stored without a gateway id");
            Err(auth_failure(AuthError::new(AuthErrorCode::Generic)))
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Sign in against the remote API
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginForm,
    responses(
        (status = 200, description = "Login successful", body = SignedIn),
        (status = 401, description = "Invalid credentials", body = AuthFailure),
        (status = 502, description = "Remote API failure", body = AuthFailure)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(form): Json<LoginForm>,
) -> Result<impl IntoResponse, (StatusCode, Json<AuthFailure>)> {
    let session = state
        .sessions
        .login(&form.email, &form.password, form.remember_me)
        .await
        .map_err(auth_failure)?;
    let cookie = issue_cookie(&state, &session)?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(SignedIn::from(&session)),
    ))
}

/// POST /auth/register - Create an account and sign in
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterForm,
    responses(
        (status = 201, description = "Account created", body = SignedIn),
        (status = 409, description = "Email already registered", body = AuthFailure),
        (status = 502, description = "Remote API failure", body = AuthFailure)
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(form): Json<RegisterForm>,
) -> Result<impl IntoResponse, (StatusCode, Json<AuthFailure>)> {
    let request = RegisterRequest {
        email: form.email,
        password: form.password,
        first_name: form.first_name,
        last_name: form.last_name,
        remember_me: form.remember_me,
    };
    let session = state.sessions.register(&request).await.map_err(|e| {
        error!("Registration failed: {}", e);
        auth_failure(e)
    })?;
    let cookie = issue_cookie(&state, &session)?;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(SignedIn::from(&session)),
    ))
}

/// POST /auth/logout - End the session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logged out; the auth cookie is cleared")
    )
)]
pub async fn logout_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.sessions.logout().await;
    let cookie = format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", AUTH_COOKIE);
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)])
}

/// GET /login - Where the route guard sends anonymous requests
#[utoipa::path(
    get,
    path = "/login",
    responses(
        (status = 200, description = "Login instructions")
    )
)]
pub async fn login_page() -> impl IntoResponse {
    (
        StatusCode::OK,
        "Inicie sesión con POST /auth/login {\"email\", \"password\", \"remember_me\"}",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_map_to_statuses() {
        let (status, body) = auth_failure(AuthError::new(AuthErrorCode::EmailExists));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.code, "EMAIL_EXISTS");

        let (status, _) = auth_failure(AuthError::new(AuthErrorCode::ServerError(401)));
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = auth_failure(AuthError::new(AuthErrorCode::ServerError(500)));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.code, "SERVER_ERROR_500");
    }

    #[test]
    fn remembered_sessions_get_a_lasting_cookie() {
        let cookie = session_cookie("0b7e", true);
        assert!(cookie.starts_with("auth_token=0b7e; HttpOnly"));
        assert!(cookie.ends_with(&format!("Max-Age={}", REMEMBER_ME_MAX_AGE_SECS)));
        assert!(!session_cookie("0b7e", false).contains("Max-Age"));
    }
}
