use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

/// Static bearer-style tokens accepted on the ingestion routes.
#[derive(Clone, Debug, Default)]
pub struct TokenAuth {
    enabled: bool,
    tokens: HashSet<String>,
}

impl TokenAuth {
    /// `tokens` is a comma separated list, blank items are ignored.
    pub fn new(enabled: bool, tokens: &str) -> Self {
        let tokens = tokens
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
            .collect();
        TokenAuth { enabled, tokens }
    }

    pub fn disabled() -> Self {
        TokenAuth::default()
    }

    // Expects "<scheme> <token>", the scheme itself is not checked.
    fn is_authorized(&self, header: Option<&str>) -> bool {
        header
            .and_then(|value| value.split(' ').nth(1))
            .map(|token| self.tokens.contains(token))
            .unwrap_or(false)
    }
}

pub async fn require_token(
    State(auth): State<Arc<TokenAuth>>,
    mut req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }
    if req.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if !auth.is_authorized(header) {
        warn!(path = req.uri().path(), "rejected request without a valid token");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    req.headers_mut().remove(AUTHORIZATION);
    next.run(req).await
}
