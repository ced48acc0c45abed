use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::ParseError;
use crate::sinks::StorageError;

/// Internal error codes. The thousands digit tells the class: 1xxx for
/// system failures, 2xxx for problems with the client's input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    Database = 1000,
    System = 1001,
    Unmarshal = 2000,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// HTTP status for an internal error code. Unknown codes map to 418 so they
/// stand out in dashboards.
pub fn http_status(code: u32) -> StatusCode {
    match code {
        1000 | 1001 => StatusCode::INTERNAL_SERVER_ERROR,
        2000 => StatusCode::BAD_REQUEST,
        _ => StatusCode::IM_A_TEAPOT,
    }
}

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("parse json failed: {0}")]
    Unmarshal(#[from] ParseError),
    #[error("{context}: {source}")]
    Database {
        context: &'static str,
        #[source]
        source: StorageError,
    },
    #[error("system error: {0}")]
    System(String),
}

impl CollectorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CollectorError::Unmarshal(_) => ErrorCode::Unmarshal,
            CollectorError::Database { .. } => ErrorCode::Database,
            CollectorError::System(_) => ErrorCode::System,
        }
    }

    /// Message safe to return to clients, without internal details.
    pub fn public_message(&self) -> &'static str {
        match self {
            CollectorError::Unmarshal(_) => "parse json failed",
            CollectorError::Database { context, .. } => *context,
            CollectorError::System(_) => "system error",
        }
    }
}

/// Build metadata served on `/api/v1/info`. Built once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BuildInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_at: String,
}

impl BuildInfo {
    /// `GIT_HASH` and `BUILD_AT` are read from the build environment.
    pub fn new(service_name: &str) -> Self {
        BuildInfo {
            service_name: service_name.to_owned(),
            app_name: env!("CARGO_PKG_NAME").to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            git_hash: option_env!("GIT_HASH").unwrap_or_default().to_owned(),
            build_at: option_env!("BUILD_AT").unwrap_or_default().to_owned(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for CollectorError {
    fn into_response(self) -> Response {
        let status = http_status(self.code().as_u32());
        let body = ErrorResponse {
            code: status.as_u16(),
            message: self.public_message().to_owned(),
        };
        (status, Json(body)).into_response()
    }
}
