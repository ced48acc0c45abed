use async_trait::async_trait;
use thiserror::Error;

use crate::entry::Entry;

pub mod clickhouse;
pub mod print;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unreachable: {0}")]
    Connection(String),
    #[error("insert failed: {0}")]
    Insert(String),
    #[error("entry queue is closed")]
    QueueClosed,
}

/// Destination of flushed batches. Only the batch writer calls
/// `insert_entries`, one call per flush.
#[async_trait]
pub trait Storage {
    async fn ping(&self) -> Result<(), StorageError>;
    async fn insert_entries(&self, entries: &[Entry]) -> Result<(), StorageError>;
}
