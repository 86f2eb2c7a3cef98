//! services/dashboard/src/session/cookies.rs
//!
//! The cookies the gateway exchanges with the remote API: the `auth_token`
//! mirror of the access token and the CSRF token set by the server.

use std::collections::BTreeMap;
use std::sync::RwLock;

pub const AUTH_COOKIE: &str = "auth_token";
pub const CSRF_COOKIE: &str = "csrftoken";

#[derive(Default)]
pub struct CookieJar {
    cookies: RwLock<BTreeMap<String, String>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.cookies.read().ok()?.get(name).cloned()
    }

    pub fn set(&self, name: &str, value: &str) {
        if let Ok(mut cookies) = self.cookies.write() {
            cookies.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove(&self, name: &str) {
        if let Ok(mut cookies) = self.cookies.write() {
            cookies.remove(name);
        }
    }

    pub fn csrf_token(&self) -> Option<String> {
        self.get(CSRF_COOKIE).filter(|t| !t.is_empty())
    }

    /// Applies one `Set-Cookie` header. An empty value or `Max-Age=0`
    /// deletes the cookie.
    pub fn absorb(&self, set_cookie: &str) {
        let mut parts = set_cookie.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let (name, value) = (name.trim(), value.trim().trim_matches('"'));
        if name.is_empty() {
            return;
        }
        let expired = parts.any(|attr| {
            attr.split_once('=')
                .map(|(k, v)| k.trim().eq_ignore_ascii_case("max-age") && v.trim() == "0")
                .unwrap_or(false)
        });
        if expired || value.is_empty() {
            self.remove(name);
        } else {
            self.set(name, value);
        }
    }

    /// Value for an outgoing `Cookie` header, if there is anything to send.
    pub fn header_value(&self) -> Option<String> {
        let cookies = self.cookies.read().ok()?;
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Reads one cookie from a raw `Cookie` request header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        pair.trim()
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
    })
}
