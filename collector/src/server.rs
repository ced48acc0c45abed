use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderName;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api::BuildInfo;
use crate::auth::TokenAuth;
use crate::config::Config;
use crate::queue::entry_queue;
use crate::router;
use crate::service::EntryService;
use crate::sinks::clickhouse::ClickHouseStorage;
use crate::sinks::print::PrintStorage;
use crate::sinks::Storage;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    anyhow::ensure!(
        !config.writer_period.0.is_zero(),
        "WRITER_PERIOD_MS must be positive"
    );
    let ip_header = config
        .ip_header
        .as_deref()
        .map(HeaderName::try_from)
        .transpose()
        .context("invalid IP_HEADER")?;

    let storage: Arc<dyn Storage + Send + Sync> = if config.print_sink {
        Arc::new(PrintStorage {})
    } else {
        Arc::new(ClickHouseStorage::new(
            &config.clickhouse,
            config.retry_policy.policy(),
        ))
    };
    if let Err(err) = storage.ping().await {
        warn!("storage is not reachable yet: {}", err);
    }

    let (queue, writer) = entry_queue(storage, config.writer_capacity, config.writer_period.0);
    let writer = tokio::spawn(writer.run());

    let app = router::router(
        EntryService::new(Arc::new(queue.clone())),
        BuildInfo::new(&config.service_name),
        TokenAuth::new(config.auth_enabled, &config.auth_tokens),
        ip_header,
        config.request_timeout.0,
        config.export_prometheus,
    );

    info!("listening on {:?}", listener.local_addr()?);
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;

    // Flush what is still queued even when the server failed.
    queue.stop();
    writer.await.context("batch writer panicked")?;
    info!("collector stopped");

    served.context("http server failed")
}
