use std::convert::Infallible;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_client_ip::InsecureClientIp;

use crate::router;

/// Address of the client that sent the request.
///
/// Taken from the configured IP header when present (first item of a comma
/// separated list), then from the usual forwarding headers and the peer
/// address. Empty when none of them is available.
pub struct RemoteIp(pub String);

#[async_trait]
impl FromRequestParts<router::State> for RemoteIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &router::State,
    ) -> Result<Self, Self::Rejection> {
        if let Some(header) = &state.ip_header {
            let forwarded = parts
                .headers
                .get(header)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty());
            if let Some(ip) = forwarded {
                return Ok(RemoteIp(ip.to_owned()));
            }
        }

        let ip = InsecureClientIp::from_request_parts(parts, state)
            .await
            .map(|InsecureClientIp(ip)| ip.to_string())
            .unwrap_or_default();
        Ok(RemoteIp(ip))
    }
}
