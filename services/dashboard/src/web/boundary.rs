//! services/dashboard/src/web/boundary.rs
//!
//! Top-level error boundary. A handler that panics gets a generic recovery
//! page with a retry link; the panic is logged under a correlation id that
//! the page also shows.

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;
use uuid::Uuid;

pub fn recovery_page(panic: Box<dyn Any + Send + 'static>) -> Response {
    let correlation_id = Uuid::new_v4();
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic payload"
    };
    error!(%correlation_id, "Unhandled failure while rendering: {}", detail);

    let body = format!(
        "<!doctype html>\n<html lang=\"es\"><body>\
         <h1>Algo salió mal</h1>\
         <p>Ocurrió un error inesperado. Puede intentarlo de nuevo.</p>\
         <p><a href=\"\">Reintentar</a></p>\
         <p><small>Referencia: {}</small></p>\
         </body></html>",
        correlation_id
    );
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, Html(body)).into_response();
    if let Ok(value) = correlation_id.to_string().parse() {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}
