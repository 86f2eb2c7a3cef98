//! crates/cardio_core/src/token.rs
//!
//! Inspection of the bearer tokens issued by the remote API.
//!
//! Tokens are JWTs. The dashboard never verifies signatures (the server does);
//! it only reads the `exp` claim to decide whether to refresh proactively.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

/// Remaining lifetime (seconds) below which the access token is refreshed ahead of time.
pub const REFRESH_THRESHOLD_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    Malformed,
    #[error("token payload is not valid base64url: {0}")]
    Encoding(String),
    #[error("token payload is not valid JSON: {0}")]
    Claims(String),
    #[error("token has no usable exp claim")]
    MissingExpiry,
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Reads the `exp` claim of a JWT.
pub fn expiry(token: &str) -> Result<DateTime<Utc>, TokenError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
        _ => return Err(TokenError::Malformed),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TokenError::Encoding(e.to_string()))?;
    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Claims(e.to_string()))?;

    let exp = claims.exp.ok_or(TokenError::MissingExpiry)?;
    Utc.timestamp_opt(exp, 0)
        .single()
        .ok_or(TokenError::MissingExpiry)
}

/// Time left before the token expires; negative once it has.
pub fn remaining_lifetime(token: &str, now: DateTime<Utc>) -> Result<Duration, TokenError> {
    Ok(expiry(token)? - now)
}

/// `true` only when the token decodes and its expiry is in the future.
pub fn is_token_valid_at(token: &str, now: DateTime<Utc>) -> bool {
    matches!(expiry(token), Ok(exp) if exp > now)
}

pub fn is_token_valid(token: &str) -> bool {
    is_token_valid_at(token, Utc::now())
}

/// Whether the token is close enough to expiry that it should be refreshed now.
pub fn needs_refresh(token: &str, now: DateTime<Utc>) -> Result<bool, TokenError> {
    Ok(remaining_lifetime(token, now)? < Duration::seconds(REFRESH_THRESHOLD_SECS))
}
