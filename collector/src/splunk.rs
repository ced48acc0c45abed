//! Splunk HTTP Event Collector compatibility.
//!
//! HEC clients post several envelopes back to back with no separator:
//! `{"event":{"line":{...}}}{"event":{"line":{...}}}`. Objects are split on the
//! `}{` marker, which is a heuristic: a string value containing `}{` cuts its
//! object in two and both halves are then rejected as malformed envelopes.
//!
//! An envelope without `event.line`, such as `{"event":{}}`, counts as
//! malformed too: it is skipped and the request still answers 200.
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::{error, instrument};

use crate::api::CollectorError;
use crate::extractors::RemoteIp;
use crate::prometheus::report_dropped_entries;
use crate::router;
use crate::service::EntryService;

#[derive(Deserialize)]
pub struct Message {
    pub event: Event,
}

#[derive(Deserialize)]
pub struct Event {
    pub line: Box<RawValue>,
}

/// Iterator over the objects of a concatenated JSON stream.
pub struct ObjectSplitter<'a> {
    rest: &'a [u8],
}

pub fn split_objects(data: &[u8]) -> ObjectSplitter<'_> {
    ObjectSplitter { rest: data }
}

impl<'a> Iterator for ObjectSplitter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }
        match self.rest.windows(2).position(|pair| pair == b"}{") {
            Some(idx) => {
                let (object, rest) = self.rest.split_at(idx + 1);
                self.rest = rest;
                Some(object)
            }
            None => Some(std::mem::take(&mut self.rest)),
        }
    }
}

/// Store the `line` of every envelope in `data`. Malformed envelopes are
/// skipped, a failure to store stops at that envelope. Returns how many lines
/// were stored.
pub async fn handle_events(
    service: &EntryService,
    remote_ip: &str,
    data: &[u8],
) -> Result<usize, CollectorError> {
    let mut stored = 0;
    for object in split_objects(data) {
        let message: Message = match serde_json::from_slice(object) {
            Ok(message) => message,
            Err(err) => {
                error!("unmarshal splunk envelope failed: {}", err);
                report_dropped_entries("invalid_hec_envelope", 1);
                continue;
            }
        };
        service
            .store_item(remote_ip, message.event.line.get().as_bytes())
            .await?;
        stored += 1;
    }
    Ok(stored)
}

#[instrument(skip_all, fields(remote_ip, body_size))]
pub async fn event(
    State(state): State<router::State>,
    RemoteIp(remote_ip): RemoteIp,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, (StatusCode, &'static str)> {
    tracing::Span::current().record("remote_ip", remote_ip.as_str());
    let body = body.map_err(|err| {
        error!("read data failed: {}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "read data failed")
    })?;
    tracing::Span::current().record("body_size", body.len());

    handle_events(&state.service, &remote_ip, &body)
        .await
        .map_err(|err| {
            error!("handle splunk events failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "handle message failed")
        })?;

    Ok(StatusCode::OK)
}
