use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use tracing::Level;

use crate::retry::RetryPolicy;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "false")]
    pub print_sink: bool,
    #[envconfig(default = "127.0.0.1:3000")]
    pub address: SocketAddr,
    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    #[envconfig(nested = true)]
    pub clickhouse: ClickHouseConfig,

    #[envconfig(default = "1000")]
    pub writer_capacity: NonZeroUsize,
    #[envconfig(from = "WRITER_PERIOD_MS", default = "1000")]
    pub writer_period: EnvMsDuration,

    #[envconfig(from = "REQUEST_TIMEOUT_MS", default = "60000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(nested = true)]
    pub retry_policy: RetryPolicyConfig,

    // Header set by a trusted proxy, e.g. X-Real-IP.
    pub ip_header: Option<String>,

    #[envconfig(default = "false")]
    pub auth_enabled: bool,
    #[envconfig(default = "")]
    pub auth_tokens: String,

    #[envconfig(default = "collector")]
    pub service_name: String,

    pub otel_url: Option<String>,
    #[envconfig(default = "1.0")]
    pub otel_sampling_rate: f64,
    #[envconfig(default = "info")]
    pub log_level: Level,
}

#[derive(Envconfig, Clone)]
pub struct ClickHouseConfig {
    #[envconfig(default = "http://localhost:8123")]
    pub clickhouse_url: String,
    #[envconfig(default = "default")]
    pub clickhouse_database: String,
    #[envconfig(default = "default")]
    pub clickhouse_user: String,
    #[envconfig(default = "")]
    pub clickhouse_password: String,
    #[envconfig(default = "internal_logs_buffer")]
    pub clickhouse_table: String,
}

#[derive(Envconfig, Clone)]
pub struct RetryPolicyConfig {
    #[envconfig(from = "STORAGE_MAX_RETRIES", default = "10")]
    pub max_retries: u32,
    #[envconfig(from = "STORAGE_RETRY_BACKOFF_COEFFICIENT", default = "2")]
    pub backoff_coefficient: u32,
    #[envconfig(from = "STORAGE_RETRY_INITIAL_INTERVAL_MS", default = "100")]
    pub initial_interval: EnvMsDuration,
    #[envconfig(from = "STORAGE_RETRY_MAXIMUM_INTERVAL_MS", default = "5000")]
    pub maximum_interval: EnvMsDuration,
}

impl RetryPolicyConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::build(self.backoff_coefficient, self.initial_interval.0)
            .maximum_interval(self.maximum_interval.0)
            .max_retries(self.max_retries)
            .provide()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}
