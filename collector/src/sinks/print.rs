use async_trait::async_trait;

use crate::entry::Entry;
use crate::sinks::{Storage, StorageError};

/// Logs entries instead of storing them, for local runs without ClickHouse.
pub struct PrintStorage {}

#[async_trait]
impl Storage for PrintStorage {
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_entries(&self, entries: &[Entry]) -> Result<(), StorageError> {
        let span = tracing::span!(tracing::Level::INFO, "batch of entries");
        let _enter = span.enter();

        for entry in entries {
            tracing::info!("entry: {:?}", entry);
        }

        Ok(())
    }
}
