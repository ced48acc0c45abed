use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use tracing::{error, instrument};

use crate::api::{BuildInfo, CollectorError};
use crate::extractors::RemoteIp;
use crate::router;

fn read_body(body: Result<Bytes, BytesRejection>) -> Result<Bytes, CollectorError> {
    body.map_err(|err| {
        error!("read body failed: {}", err);
        CollectorError::System(err.body_text())
    })
}

#[instrument(skip_all, fields(remote_ip, body_size))]
pub async fn store(
    State(state): State<router::State>,
    RemoteIp(remote_ip): RemoteIp,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, CollectorError> {
    tracing::Span::current().record("remote_ip", remote_ip.as_str());
    let body = read_body(body)?;
    tracing::Span::current().record("body_size", body.len());

    state.service.store_item(&remote_ip, &body).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip_all, fields(remote_ip, body_size))]
pub async fn store_list(
    State(state): State<router::State>,
    RemoteIp(remote_ip): RemoteIp,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, CollectorError> {
    tracing::Span::current().record("remote_ip", remote_ip.as_str());
    let body = read_body(body)?;
    tracing::Span::current().record("body_size", body.len());

    state.service.store_list(&remote_ip, &body).await?;
    Ok(StatusCode::OK)
}

pub async fn ping(State(state): State<router::State>) -> Result<StatusCode, CollectorError> {
    state.service.ping().await?;
    Ok(StatusCode::OK)
}

pub async fn info(State(state): State<router::State>) -> Json<BuildInfo> {
    Json(state.info.as_ref().clone())
}
