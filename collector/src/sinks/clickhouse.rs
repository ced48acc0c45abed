use async_trait::async_trait;
use clickhouse::{Client, Row};
use serde::Serialize;
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

use crate::config::ClickHouseConfig;
use crate::entry::Entry;
use crate::retry::RetryPolicy;
use crate::sinks::{Storage, StorageError};

/// One row of the logs table:
///
/// ```sql
/// CREATE TABLE internal_logs_buffer (
///     time DateTime, date Date, nsec Int64,
///     namespace String, source String, host String, level String,
///     trace_id String, message String, params String,
///     params_string Nested(keys String, values String),
///     params_float Nested(keys String, values Float64),
///     build_commit String, config_hash String, remote_ip String,
///     row_id UInt64
/// ) ...
/// ```
#[derive(Row, Serialize)]
struct LogRow<'a> {
    #[serde(with = "clickhouse::serde::time::datetime")]
    time: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::date")]
    date: Date,
    nsec: i64,
    namespace: &'a str,
    source: &'a str,
    host: &'a str,
    level: &'a str,
    trace_id: &'a str,
    message: &'a str,
    params: &'a str,
    #[serde(rename = "params_string.keys")]
    string_keys: &'a [String],
    #[serde(rename = "params_string.values")]
    string_values: &'a [String],
    #[serde(rename = "params_float.keys")]
    float_keys: &'a [String],
    #[serde(rename = "params_float.values")]
    float_values: &'a [f64],
    build_commit: &'a str,
    config_hash: &'a str,
    remote_ip: &'a str,
    row_id: u64,
}

// DateTime is stored as unsigned 32-bit seconds, 2106-02-07 06:28:15 UTC is the last one.
// Every Date up to that day also fits in the unsigned 16-bit day count.
fn latest_datetime() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(i64::from(u32::MAX))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

impl<'a> LogRow<'a> {
    fn new(entry: &'a Entry) -> Self {
        let time = entry
            .time
            .clamp(OffsetDateTime::UNIX_EPOCH, latest_datetime());
        let nsec = i64::try_from(entry.time.unix_timestamp_nanos()).unwrap_or_default();

        LogRow {
            time,
            date: time.date(),
            nsec,
            namespace: &entry.namespace,
            source: &entry.source,
            host: &entry.host,
            level: &entry.level,
            trace_id: &entry.trace_id,
            message: &entry.message,
            params: &entry.params,
            string_keys: &entry.string_keys,
            string_values: &entry.string_values,
            float_keys: &entry.float_keys,
            float_values: &entry.float_values,
            build_commit: &entry.build_commit,
            config_hash: &entry.config_hash,
            remote_ip: &entry.remote_ip,
            row_id: rand::random(),
        }
    }
}

pub struct ClickHouseStorage {
    client: Client,
    table: String,
    retry_policy: RetryPolicy,
}

impl ClickHouseStorage {
    pub fn new(config: &ClickHouseConfig, retry_policy: RetryPolicy) -> Self {
        info!(
            "writing entries to ClickHouse at {}, table {}",
            config.clickhouse_url, config.clickhouse_table
        );
        let client = Client::default()
            .with_url(config.clickhouse_url.clone())
            .with_database(config.clickhouse_database.clone())
            .with_user(config.clickhouse_user.clone())
            .with_password(config.clickhouse_password.clone());

        ClickHouseStorage {
            client,
            table: config.clickhouse_table.clone(),
            retry_policy,
        }
    }

    // All rows go through a single INSERT. Dropping `insert` before `end`
    // aborts it, so a failed write leaves nothing behind.
    async fn try_insert(&self, entries: &[Entry]) -> Result<(), clickhouse::error::Error> {
        let mut insert = self.client.insert(&self.table)?;
        for entry in entries {
            insert.write(&LogRow::new(entry)).await?;
        }
        insert.end().await
    }
}

#[async_trait]
impl Storage for ClickHouseStorage {
    async fn ping(&self) -> Result<(), StorageError> {
        self.retry_policy
            .run("ping", || self.client.query("SELECT 1").execute())
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))
    }

    async fn insert_entries(&self, entries: &[Entry]) -> Result<(), StorageError> {
        self.retry_policy
            .run("insert", || self.try_insert(entries))
            .await
            .map_err(|err| StorageError::Insert(err.to_string()))?;

        debug!(rows = entries.len(), "inserted entries into {}", self.table);
        Ok(())
    }
}
