use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, instrument};

use crate::api::CollectorError;
use crate::entry::{self, Entry};
use crate::prometheus::report_received_entries;
use crate::sinks::StorageError;

/// Where the service hands normalized entries. Implemented by the entry queue
/// in production and by in-memory doubles in tests.
#[async_trait]
pub trait EntryStore {
    async fn ping(&self) -> Result<(), StorageError>;
    async fn store_entry_list(&self, entries: Vec<Entry>) -> Result<(), StorageError>;
}

#[derive(Clone)]
pub struct EntryService {
    store: Arc<dyn EntryStore + Send + Sync>,
}

impl EntryService {
    pub fn new(store: Arc<dyn EntryStore + Send + Sync>) -> Self {
        EntryService { store }
    }

    #[instrument(skip_all)]
    pub async fn ping(&self) -> Result<(), CollectorError> {
        self.store.ping().await.map_err(|err| {
            error!("ping db failed: {}", err);
            CollectorError::Database {
                context: "ping db failed",
                source: err,
            }
        })
    }

    #[instrument(skip_all, fields(remote_ip = remote_ip, body_size = data.len()))]
    pub async fn store_item(&self, remote_ip: &str, data: &[u8]) -> Result<(), CollectorError> {
        let mut entry = Entry::parse(data).map_err(|err| {
            error!("parse entry failed: {}", err);
            CollectorError::Unmarshal(err)
        })?;
        entry.set_remote_ip(remote_ip);

        self.store(vec![entry]).await
    }

    #[instrument(skip_all, fields(remote_ip = remote_ip, body_size = data.len()))]
    pub async fn store_list(&self, remote_ip: &str, data: &[u8]) -> Result<(), CollectorError> {
        let mut entries = entry::parse_list(data).map_err(|err| {
            error!("parse entry list failed: {}", err);
            CollectorError::Unmarshal(err)
        })?;
        for entry in entries.iter_mut() {
            entry.set_remote_ip(remote_ip);
        }

        self.store(entries).await
    }

    async fn store(&self, entries: Vec<Entry>) -> Result<(), CollectorError> {
        let count = entries.len() as u64;
        self.store.store_entry_list(entries).await.map_err(|err| {
            error!("store entry list failed: {}", err);
            CollectorError::Database {
                context: "store entry list failed",
                source: err,
            }
        })?;
        report_received_entries(count);
        Ok(())
    }
}
