//! services/dashboard/src/web/state.rs
//!
//! Defines the gateway's shared state.

use std::sync::Arc;

use cardio_core::ports::{AuthApi, ClinicalApi, PredictionGateway};

use crate::adapters::RestApi;
use crate::config::Config;
use crate::session::SessionManager;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager<dyn AuthApi>>,
    pub clinical: Arc<dyn ClinicalApi>,
    pub predictions: Arc<dyn PredictionGateway>,
}

impl AppState {
    /// Wires every port to the same REST adapter.
    pub fn from_rest_api(
        config: Arc<Config>,
        api: Arc<RestApi>,
        sessions: Arc<SessionManager<dyn AuthApi>>,
    ) -> Self {
        Self {
            config,
            sessions,
            clinical: api.clone(),
            predictions: api,
        }
    }
}
