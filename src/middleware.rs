use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::Config;
use crate::state::AppState;

pub const REALM_CHALLENGE: &str = "Basic realm=\"Droopy\"";

/// outcome of the credential check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Proceed,
    Unauthorized,
}

/// optional HTTP Basic gate.
///
/// the expected header is kept only as a digest; both sides are hashed and
/// the digests compared with a full xor fold, so timing depends on neither
/// the credential length nor where a mismatch starts.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    expected: Option<[u8; 32]>,
}

impl AccessGuard {
    /// `expected` is the full header value, `Basic <base64>`
    pub fn new(expected: Option<&str>) -> Self {
        Self {
            expected: expected.map(|e| Config::hash_credential(e.as_bytes())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    pub fn check(&self, headers: &HeaderMap) -> Access {
        let Some(expected) = &self.expected else {
            return Access::Proceed;
        };
        let Some(received) = headers.get(header::AUTHORIZATION) else {
            tracing::debug!("Missing Authorization header");
            return Access::Unauthorized;
        };
        let received = Config::hash_credential(received.as_bytes());
        let diff = expected
            .iter()
            .zip(received.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 {
            Access::Proceed
        } else {
            tracing::warn!("🚫 Invalid credentials");
            Access::Unauthorized
        }
    }
}

pub fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [
            (header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM_CHALLENGE)),
            (header::CONTENT_TYPE, HeaderValue::from_static("text/html")),
        ],
    )
        .into_response()
}

// basic auth in front of every route
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    match state.guard.check(req.headers()) {
        Access::Proceed => next.run(req).await,
        Access::Unauthorized => unauthorized_response(),
    }
}

/// headers & such
pub async fn add_security_headers(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

    response
}
