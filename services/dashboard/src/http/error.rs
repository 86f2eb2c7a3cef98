//! services/dashboard/src/http/error.rs
//!
//! Typed failures of the HTTP pipeline and their user-facing messages.

use cardio_core::ports::PortError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HttpError {
    /// The server could not be reached.
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
    /// The caller gave up on the request. Never shown to the user.
    #[error("Request cancelled")]
    Cancelled,
    #[error("Server responded with status {status}: {message}")]
    Status { status: u16, message: String },
    /// A 401 could not be recovered by refreshing the access token.
    #[error("Session expired")]
    SessionExpired,
    #[error("Could not decode the response: {0}")]
    Decode(String),
}

impl HttpError {
    /// Cancellations are expected during teardown and are not reported.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Localized text suitable for a notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => {
                "No se pudo conectar con el servidor. Verifique su conexión.".to_string()
            }
            Self::Timeout(_) => "La solicitud tardó demasiado. Inténtelo de nuevo.".to_string(),
            Self::Cancelled => String::new(),
            Self::SessionExpired => {
                "Su sesión ha expirado. Inicie sesión nuevamente.".to_string()
            }
            Self::Decode(_) => "Respuesta inesperada del servidor.".to_string(),
            Self::Status { status, message } => match status {
                400 if !message.is_empty() => message.clone(),
                400 => "Datos inválidos.".to_string(),
                403 => "No tiene permisos para realizar esta acción.".to_string(),
                404 => "El recurso solicitado no existe.".to_string(),
                409 => "El recurso ya existe.".to_string(),
                429 => "Demasiadas solicitudes. Espere un momento.".to_string(),
                s if *s >= 500 => "Error del servidor. Inténtelo más tarde.".to_string(),
                _ => format!("Error inesperado ({}).", status),
            },
        }
    }
}

impl From<HttpError> for PortError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Cancelled => PortError::Cancelled,
            HttpError::SessionExpired => PortError::SessionExpired,
            HttpError::Status { status: 401, .. } => PortError::Unauthorized,
            HttpError::Status { status: 404, message } => PortError::NotFound(message),
            HttpError::Status { status, message } => PortError::Rejected { status, message },
            HttpError::Network(msg) => PortError::Unavailable(msg),
            HttpError::Timeout(secs) => {
                PortError::Unavailable(format!("timed out after {}s", secs))
            }
            HttpError::Decode(msg) => PortError::Unexpected(msg),
        }
    }
}
