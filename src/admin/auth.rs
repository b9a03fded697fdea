use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::server::ManagementState;

/// Result of authenticating a management request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(String),
    /// No credentials were presented.
    NotAttempted,
    Failed,
}

/// Authentication delegate for management requests.
pub trait HttpAuthenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome;

    /// Value of the `WWW-Authenticate` challenge sent on 401.
    fn challenge(&self) -> &str;
}

/// Accepts requests carrying `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct BearerTokenAuthenticator {
    token: String,
    challenge: String,
}

impl BearerTokenAuthenticator {
    pub fn new(token: impl Into<String>, realm: &str) -> Self {
        Self {
            token: token.into(),
            challenge: format!("Bearer realm=\"{}\"", realm),
        }
    }
}

impl HttpAuthenticator for BearerTokenAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome {
        let Some(value) = headers.get(header::AUTHORIZATION).and_then(|h| h.to_str().ok()) else {
            return AuthOutcome::NotAttempted;
        };
        match value.strip_prefix("Bearer ") {
            Some(token) if constant_time_eq(token.as_bytes(), self.token.as_bytes()) => {
                AuthOutcome::Authenticated("bearer".to_string())
            }
            _ => AuthOutcome::Failed,
        }
    }

    fn challenge(&self) -> &str {
        &self.challenge
    }
}

/// Authenticate a management request.
///
/// Passes when no authenticator is configured. On failure returns the 401
/// response carrying the authenticator's challenge.
pub fn authorize(state: &ManagementState, request: &Request) -> Result<(), Response> {
    let Some(authenticator) = state.authenticator.as_ref() else {
        return Ok(());
    };

    match authenticator.authenticate(request.headers()) {
        AuthOutcome::Authenticated(identity) => {
            tracing::trace!(%identity, path = %request.uri().path(), "Management request authenticated");
            Ok(())
        }
        outcome => {
            tracing::debug!(?outcome, path = %request.uri().path(), "Management request rejected");
            let mut response = StatusCode::UNAUTHORIZED.into_response();
            if let Ok(value) = HeaderValue::from_str(authenticator.challenge()) {
                response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
            Err(response)
        }
    }
}

pub async fn management_auth_middleware(
    State(state): State<ManagementState>,
    request: Request,
    next: Next,
) -> Response {
    match authorize(&state, &request) {
        Ok(()) => next.run(request).await,
        Err(rejection) => rejection,
    }
}

/// Compare two byte strings in time independent of where they differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
