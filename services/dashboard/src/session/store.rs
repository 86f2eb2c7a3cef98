//! services/dashboard/src/session/store.rs
//!
//! The single owner of session tokens. Shared by the HTTP client (which reads
//! and refreshes the access token) and the session manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cardio_core::domain::{Session, User};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use super::cookies::{CookieJar, AUTH_COOKIE};
use super::storage::{KeyValueStore, StorageError};

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const AUTH_USER_KEY: &str = "auth_user";
pub const REMEMBER_ME_KEY: &str = "rememberMe";
/// Opaque id handed to the browser in the `auth_token` cookie. Never sent upstream.
pub const GATEWAY_SESSION_KEY: &str = "gateway_session";

const KEYS: [&str; 5] = [
    AUTH_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    AUTH_USER_KEY,
    REMEMBER_ME_KEY,
    GATEWAY_SESSION_KEY,
];

/// Published whenever the session changes. `Expired` means the operator
/// must be sent back to the login view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Anonymous,
    Authenticated,
    Expired,
}

pub struct SessionStore {
    durable: Arc<dyn KeyValueStore>,
    tab: Arc<dyn KeyValueStore>,
    cookies: CookieJar,
    status: watch::Sender<AuthStatus>,
    generation: AtomicU64,
}

impl SessionStore {
    pub fn new(durable: Arc<dyn KeyValueStore>, tab: Arc<dyn KeyValueStore>) -> Self {
        let (status, _) = watch::channel(AuthStatus::Anonymous);
        Self {
            durable,
            tab,
            cookies: CookieJar::new(),
            status,
            generation: AtomicU64::new(0),
        }
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn status(&self) -> AuthStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.status.subscribe()
    }

    /// Bumped whenever a session starts or ends. Anything derived from the
    /// previous session (cached responses) must not outlive it.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// The store currently holding a token: tab-scoped first, then durable.
    fn active(&self) -> Option<&Arc<dyn KeyValueStore>> {
        [&self.tab, &self.durable]
            .into_iter()
            .find(|store| store.get(AUTH_TOKEN_KEY).is_some())
    }

    /// Persists a fresh session in the store picked by `remember_me`, removes
    /// any leftover from the other store and mirrors the token into the cookie.
    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        let (target, other) = if session.remember_me {
            (&self.durable, &self.tab)
        } else {
            (&self.tab, &self.durable)
        };
        for key in KEYS {
            other.remove(key)?;
        }
        target.set(AUTH_TOKEN_KEY, &session.access_token)?;
        target.set(REFRESH_TOKEN_KEY, &session.refresh_token)?;
        target.set(AUTH_USER_KEY, &serde_json::to_string(&session.user)?)?;
        target.set(REMEMBER_ME_KEY, if session.remember_me { "true" } else { "false" })?;
        target.set(GATEWAY_SESSION_KEY, &Uuid::new_v4().to_string())?;
        self.cookies.set(AUTH_COOKIE, &session.access_token);
        self.bump_generation();
        self.status.send_replace(AuthStatus::Authenticated);
        debug!(user = %session.user.email, remember_me = session.remember_me, "Session saved");
        Ok(())
    }

    /// The persisted session, if the active store holds a complete one.
    pub fn load(&self) -> Option<Session> {
        let store = self.active()?;
        let user: User = serde_json::from_str(&store.get(AUTH_USER_KEY)?).ok()?;
        Some(Session {
            access_token: store.get(AUTH_TOKEN_KEY)?,
            refresh_token: store.get(REFRESH_TOKEN_KEY).unwrap_or_default(),
            user,
            remember_me: store.get(REMEMBER_ME_KEY).as_deref() == Some("true"),
        })
    }

    pub fn access_token(&self) -> Option<String> {
        self.active()?.get(AUTH_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.active()?
            .get(REFRESH_TOKEN_KEY)
            .filter(|t| !t.is_empty())
    }

    /// True iff a token and a user record are both present.
    pub fn has_session(&self) -> bool {
        self.active()
            .map(|store| store.get(AUTH_USER_KEY).is_some())
            .unwrap_or(false)
    }

    /// The browser-facing session id of the current session.
    pub fn gateway_session(&self) -> Option<String> {
        self.active()?
            .get(GATEWAY_SESSION_KEY)
            .filter(|id| !id.is_empty())
    }

    /// True iff a complete session exists and `presented` is its gateway id.
    pub fn verify_gateway_session(&self, presented: &str) -> bool {
        if presented.is_empty() || !self.has_session() {
            return false;
        }
        self.gateway_session()
            .is_some_and(|id| constant_time_eq(id.as_bytes(), presented.as_bytes()))
    }

    /// Replaces the access token in place after a refresh.
    pub fn set_access_token(&self, token: &str) -> Result<(), StorageError> {
        let store = self.active().unwrap_or(&self.tab);
        store.set(AUTH_TOKEN_KEY, token)?;
        self.cookies.set(AUTH_COOKIE, token);
        Ok(())
    }

    /// Re-publishes the status of a session found on disk at startup.
    pub fn mark_restored(&self) {
        self.cookies.set(AUTH_COOKIE, &self.access_token().unwrap_or_default());
        self.status.send_replace(AuthStatus::Authenticated);
    }

    /// Wipes both stores and the auth cookie. Never fails: storage errors are
    /// logged because a half-cleared session is still unusable.
    pub fn clear(&self) {
        self.wipe();
        self.status.send_replace(AuthStatus::Anonymous);
    }

    /// Like `clear`, but signals that the operator must log in again.
    pub fn expire(&self) {
        self.wipe();
        self.status.send_replace(AuthStatus::Expired);
    }

    fn wipe(&self) {
        for store in [&self.durable, &self.tab] {
            for key in KEYS {
                if let Err(e) = store.remove(key) {
                    warn!("Failed to remove {} from session storage: {}", key, e);
                }
            }
        }
        self.cookies.remove(AUTH_COOKIE);
        self.bump_generation();
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
