//! services/dashboard/src/error.rs
//!
//! Defines the primary error type for the dashboard gateway.

use axum::http::StatusCode;
use cardio_core::import::ImportError;
use cardio_core::ports::PortError;

use crate::config::ConfigError;
use crate::http::HttpError;
use crate::session::{AuthError, StorageError};

/// The primary error type for the `dashboard` service.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    #[error("HTTP Error: {0}")]
    Http(#[from] HttpError),

    #[error("Authentication Error: {0}")]
    Auth(#[from] AuthError),

    #[error("Import Error: {0}")]
    Import(#[from] ImportError),

    #[error("Session Storage Error: {0}")]
    Storage(#[from] StorageError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Status and operator-facing message for a failed remote call.
pub fn port_error_response(err: &PortError) -> (StatusCode, String) {
    match err {
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, "Recurso no encontrado".to_string()),
        PortError::Unauthorized | PortError::SessionExpired => (
            StatusCode::UNAUTHORIZED,
            "Su sesión ha expirado. Inicie sesión nuevamente.".to_string(),
        ),
        PortError::Rejected { status, message } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            if message.is_empty() {
                format!("El servidor rechazó la solicitud ({})", status)
            } else {
                message.clone()
            },
        ),
        PortError::Unavailable(_) => (
            StatusCode::BAD_GATEWAY,
            "No se pudo conectar con el servidor.".to_string(),
        ),
        PortError::Cancelled => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Solicitud cancelada".to_string(),
        ),
        PortError::Unexpected(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error inesperado".to_string(),
        ),
    }
}
