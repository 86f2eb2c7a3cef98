//! services/dashboard/src/session/monitor.rs
//!
//! The background task that keeps the access token fresh while signed in.

use std::sync::Arc;
use std::time::Duration;

use cardio_core::ports::AuthApi;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::SessionManager;

/// Calls `check_and_refresh_token` every `every` while a session exists,
/// until `shutdown` is cancelled.
pub fn spawn_refresh_monitor<A>(
    manager: Arc<SessionManager<A>>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    A: AuthApi + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = every.as_secs(), "Token refresh monitor started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Token refresh monitor stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if !manager.is_authenticated() {
                        continue;
                    }
                    match manager.check_and_refresh_token().await {
                        Ok(true) => debug!("Monitor refreshed the access token"),
                        Ok(false) => {}
                        Err(e) => warn!("Session ended by refresh monitor: {}", e),
                    }
                }
            }
        }
    })
}
