//! services/dashboard/src/bin/dashboard.rs

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use cardio_core::ports::AuthApi;
use dashboard_lib::{
    adapters::RestApi,
    config::Config,
    error::DashboardError,
    http::HttpClient,
    session::{spawn_refresh_monitor, AuthStatus, FileStore, MemoryStore, SessionManager, SessionStore},
    web::{build_router, AppState},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), DashboardError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Remote API at {}", config.api_base_url);

    // --- 2. Session Storage & HTTP Pipeline ---
    let durable = Arc::new(FileStore::open(&config.storage_dir)?);
    info!("Durable session storage at {:?}", durable.path());
    let store = Arc::new(SessionStore::new(durable, Arc::new(MemoryStore::new())));
    let client = Arc::new(HttpClient::from_config(&config, store.clone()));
    let api = Arc::new(RestApi::new(client.clone(), config.recent_record_window));

    // --- 3. Session Manager & Background Refresh ---
    let auth: Arc<dyn AuthApi> = api.clone();
    let sessions = Arc::new(SessionManager::new(auth, store));
    match sessions.restore().await {
        Some(session) => info!("Signed in as {}", session.user.email),
        None => info!("No persisted session; waiting for login"),
    }

    let shutdown = CancellationToken::new();
    let monitor = spawn_refresh_monitor(
        sessions.clone(),
        config.refresh_check_interval,
        shutdown.clone(),
    );

    let mut status = sessions.subscribe();
    let status_shutdown = shutdown.clone();
    let status_client = client.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = status_shutdown.cancelled() => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *status.borrow_and_update();
                    if current != AuthStatus::Authenticated {
                        status_client.cache().clear();
                    }
                    if current == AuthStatus::Expired {
                        warn!("Session expired; the operator must sign in again at /login");
                    }
                }
            }
        }
    });

    // --- 4. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState::from_rest_api(config.clone(), api, sessions));

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:3000"))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);
    let app = build_router(app_state).layer(cors);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    monitor
        .await
        .map_err(|e| DashboardError::Internal(format!("refresh monitor panicked: {}", e)))?;
    Ok(())
}
