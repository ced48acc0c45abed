use std::future::ready;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api::BuildInfo;
use crate::auth::{self, TokenAuth};
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::service::EntryService;
use crate::{endpoints, splunk};

#[derive(Clone)]
pub struct State {
    pub service: EntryService,
    pub info: Arc<BuildInfo>,
    pub ip_header: Option<HeaderName>,
}

async fn index() -> &'static str {
    "collector"
}

pub fn router(
    service: EntryService,
    info: BuildInfo,
    auth: TokenAuth,
    ip_header: Option<HeaderName>,
    request_timeout: Duration,
    metrics: bool,
) -> Router {
    let state = State {
        service,
        info: Arc::new(info),
        ip_header,
    };

    let router = Router::new()
        .route("/api/v1/store", post(endpoints::store))
        .route("/api/v1/store/list", post(endpoints::store_list))
        .route("/api/v1/ping", get(endpoints::ping))
        .route("/services/collector/event/1.0", post(splunk::event))
        // A full queue holds ingestion requests until this fires with a 408.
        .layer(TimeoutLayer::new(request_timeout))
        // Routes added below this layer are served without a token.
        .layer(axum::middleware::from_fn_with_state(
            Arc::new(auth),
            auth::require_token,
        ))
        .route("/", get(index))
        .route("/api/v1/info", get(endpoints::info))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when the collector is used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
