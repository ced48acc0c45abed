pub mod api;
pub mod auth;
pub mod config;
pub mod endpoints;
pub mod entry;
pub mod extractors;
pub mod json;
pub mod prometheus;
pub mod queue;
pub mod retry;
pub mod router;
pub mod server;
pub mod service;
pub mod sinks;
pub mod splunk;
