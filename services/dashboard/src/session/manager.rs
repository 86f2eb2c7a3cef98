//! services/dashboard/src/session/manager.rs
//!
//! Login, registration, logout and proactive token refresh for the operator
//! session.

use std::fmt;
use std::sync::Arc;

use cardio_core::domain::{AuthResponse, LoginRequest, RegisterRequest, Session, User};
use cardio_core::ports::{AuthApi, PortError};
use cardio_core::token;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use super::store::{AuthStatus, SessionStore};

//=========================================================================================
// AuthError
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    EmailExists,
    SessionExpired,
    ServerError(u16),
    InvalidUserData,
    Generic,
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmailExists => f.write_str("EMAIL_EXISTS"),
            Self::SessionExpired => f.write_str("SESSION_EXPIRED"),
            Self::ServerError(status) => write!(f, "SERVER_ERROR_{}", status),
            Self::InvalidUserData => f.write_str("INVALID_USER_DATA"),
            Self::Generic => f.write_str("GENERIC_ERROR"),
        }
    }
}

/// An authentication failure with a machine-readable code and a message
/// that can be shown to the operator as is.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
}

impl AuthError {
    pub fn new(code: AuthErrorCode) -> Self {
        let message = match code {
            AuthErrorCode::EmailExists => "Ya existe una cuenta con este correo electrónico.",
            AuthErrorCode::SessionExpired => "Su sesión ha expirado. Inicie sesión nuevamente.",
            AuthErrorCode::ServerError(401) => "Correo electrónico o contraseña incorrectos.",
            AuthErrorCode::ServerError(status) if status >= 500 => {
                "Error del servidor. Inténtelo más tarde."
            }
            AuthErrorCode::ServerError(_) => "La solicitud fue rechazada por el servidor.",
            AuthErrorCode::InvalidUserData => "Los datos de usuario recibidos no son válidos.",
            AuthErrorCode::Generic => "Ha ocurrido un error inesperado. Inténtelo de nuevo.",
        };
        Self {
            code,
            message: message.to_string(),
        }
    }

    pub fn session_expired() -> Self {
        Self::new(AuthErrorCode::SessionExpired)
    }
}

impl From<PortError> for AuthError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Rejected { status: 409, .. } => Self::new(AuthErrorCode::EmailExists),
            PortError::Rejected { status: 400, message } if !message.is_empty() => Self {
                code: AuthErrorCode::ServerError(400),
                message,
            },
            PortError::Rejected { status, .. } => Self::new(AuthErrorCode::ServerError(status)),
            PortError::Unauthorized => Self::new(AuthErrorCode::ServerError(401)),
            PortError::NotFound(_) => Self::new(AuthErrorCode::ServerError(404)),
            PortError::SessionExpired => Self::session_expired(),
            PortError::Unavailable(_) | PortError::Cancelled | PortError::Unexpected(_) => {
                Self::new(AuthErrorCode::Generic)
            }
        }
    }
}

//=========================================================================================
// SessionManager
//=========================================================================================

pub struct SessionManager<A: AuthApi + ?Sized> {
    api: Arc<A>,
    store: Arc<SessionStore>,
}

impl<A: AuthApi + ?Sized> SessionManager<A> {
    pub fn new(api: Arc<A>, store: Arc<SessionStore>) -> Self {
        Self { api, store }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.store.subscribe()
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<Session, AuthError> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let response = self.api.login(&request).await.map_err(|e| {
            warn!("Login failed for {}: {}", request.email, e);
            AuthError::from(e)
        })?;
        self.establish(response, remember_me)
    }

    /// Creates the account and signs in with the returned tokens.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Session, AuthError> {
        let response = self.api.register(request).await.map_err(|e| {
            warn!("Registration failed for {}: {}", request.email, e);
            AuthError::from(e)
        })?;
        self.establish(response, request.remember_me)
    }

    /// Tells the server (best effort) and then always clears local state.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.store.refresh_token() {
            if let Err(e) = self.api.logout(&refresh_token).await {
                warn!("Remote logout failed, clearing local session anyway: {}", e);
            }
        }
        self.store.clear();
        info!("Operator signed out");
    }

    /// A token and a user record are present. No network call, no expiry check.
    pub fn is_authenticated(&self) -> bool {
        self.store.has_session()
    }

    pub async fn check_and_refresh_token(&self) -> Result<bool, AuthError> {
        self.check_and_refresh_token_at(Utc::now()).await
    }

    /// Refreshes the access token when it expires within the threshold.
    /// Returns whether a refresh happened. An undecodable token or a failed
    /// refresh ends the session.
    pub async fn check_and_refresh_token_at(&self, now: DateTime<Utc>) -> Result<bool, AuthError> {
        let Some(access_token) = self.store.access_token() else {
            return Ok(false);
        };
        match token::needs_refresh(&access_token, now) {
            Ok(false) => return Ok(false),
            Ok(true) => {}
            Err(e) => {
                warn!("Stored access token is unreadable: {}", e);
                self.store.expire();
                return Err(AuthError::session_expired());
            }
        }

        let Some(refresh_token) = self.store.refresh_token() else {
            self.store.expire();
            return Err(AuthError::session_expired());
        };
        match self.api.refresh(&refresh_token).await {
            Ok(fresh) => {
                self.store.set_access_token(&fresh).map_err(|e| {
                    warn!("Could not persist refreshed token: {}", e);
                    AuthError::new(AuthErrorCode::Generic)
                })?;
                info!("Access token refreshed ahead of expiry");
                Ok(true)
            }
            Err(PortError::Cancelled) => Ok(false),
            Err(e) => {
                warn!("Proactive refresh failed, ending the session: {}", e);
                self.store.expire();
                Err(AuthError::session_expired())
            }
        }
    }

    /// Picks up a session persisted by an earlier run. Returns `None` when
    /// there is none or it can no longer be refreshed.
    pub async fn restore(&self) -> Option<Session> {
        self.store.load()?;
        self.store.mark_restored();
        match self.check_and_refresh_token().await {
            Ok(_) => {
                let session = self.store.load()?;
                info!(user = %session.user.email, "Restored persisted session");
                Some(session)
            }
            Err(e) => {
                info!("Persisted session could not be restored: {}", e);
                None
            }
        }
    }

    fn establish(&self, response: AuthResponse, remember_me: bool) -> Result<Session, AuthError> {
        let user: User = serde_json::from_value(response.user).map_err(|e| {
            warn!("Rejecting malformed user payload: {}", e);
            AuthError::new(AuthErrorCode::InvalidUserData)
        })?;
        let session = Session {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            user,
            remember_me,
        };
        self.store.save(&session).map_err(|e| {
            warn!("Could not persist session: {}", e);
            AuthError::new(AuthErrorCode::Generic)
        })?;
        info!(user = %session.user.email, remember_me, "Operator signed in");
        Ok(session)
    }
}
