use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::Engine;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::app_state::AppState;
use crate::error::WebbyError;
use crate::htpasswd::Htpasswd;

/// Name of the authenticated user, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser(pub String);

/// Basic auth middleware. A no-op unless `authenticate` is set.
///
/// Checks happen in a fixed order: header present (else 401), Basic scheme
/// with a decodable `user:password` pair (else 400), then the password file
/// (else 401).
pub async fn require_basic_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, WebbyError> {
    if !state.config.authenticate {
        return Ok(next.run(request).await);
    }

    let htpasswd = state.htpasswd.current();
    let username = check_credentials(&htpasswd, &state.config.realm, request.headers())?;
    debug!(%username, "authenticated");
    request.extensions_mut().insert(RemoteUser(username));
    Ok(next.run(request).await)
}

pub fn check_credentials(
    htpasswd: &Htpasswd,
    realm: &str,
    headers: &HeaderMap,
) -> Result<String, WebbyError> {
    let unauthorized = || WebbyError::Unauthorized {
        realm: realm.to_string(),
    };

    let value = headers.get(header::AUTHORIZATION).ok_or_else(unauthorized)?;
    let (username, password) = parse_basic(value.as_bytes())?;

    if htpasswd.authenticated(&username, &password) {
        Ok(username)
    } else {
        warn!(%username, "authentication failed");
        Err(unauthorized())
    }
}

/// Decode a `Basic <base64(user:password)>` header value.
pub fn parse_basic(value: &[u8]) -> Result<(String, String), WebbyError> {
    let bad = |reason: &str| WebbyError::BadRequest(reason.to_string());

    let value = std::str::from_utf8(value).map_err(|_| bad("authorization header is not UTF-8"))?;
    let (scheme, encoded) = value
        .trim()
        .split_once(' ')
        .ok_or_else(|| bad("authorization header has no credentials"))?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(bad("only Basic authentication is supported"));
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| bad("credentials are not valid base64"))?;
    let decoded = String::from_utf8(decoded).map_err(|_| bad("credentials are not UTF-8"))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| bad("credentials are missing the password"))?;

    Ok((username.to_string(), password.to_string()))
}
