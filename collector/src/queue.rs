//! Bounded entry queue with a single background writer.
//!
//! Request handlers push normalized entries through [`EntryQueue`]. One
//! [`BatchWriter`] task drains them into an in-memory batch and hands the batch
//! to [`Storage`] on every tick of the flush period, and one last time when the
//! queue is stopped.
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::entry::Entry;
use crate::prometheus::report_flush;
use crate::service::EntryStore;
use crate::sinks::{Storage, StorageError};

/// Producer side of the queue. Cheap to clone, every clone feeds the same writer.
#[derive(Clone)]
pub struct EntryQueue {
    sender: mpsc::Sender<Entry>,
    storage: Arc<dyn Storage + Send + Sync>,
    stop: CancellationToken,
}

/// Consumer side of the queue, meant to be spawned once.
pub struct BatchWriter {
    receiver: mpsc::Receiver<Entry>,
    storage: Arc<dyn Storage + Send + Sync>,
    period: Duration,
    stop: CancellationToken,
}

/// Create a queue holding at most `capacity` entries that flushes every `period`.
///
/// # Panics
///
/// The writer panics on a zero `period`.
pub fn entry_queue(
    storage: Arc<dyn Storage + Send + Sync>,
    capacity: NonZeroUsize,
    period: Duration,
) -> (EntryQueue, BatchWriter) {
    let (sender, receiver) = mpsc::channel(capacity.get());
    let stop = CancellationToken::new();

    let queue = EntryQueue {
        sender,
        storage: storage.clone(),
        stop: stop.clone(),
    };
    let writer = BatchWriter {
        receiver,
        storage,
        period,
        stop,
    };
    (queue, writer)
}

impl EntryQueue {
    /// Push entries in order. Waits while the queue is full.
    ///
    /// Entries are sent one at a time, so a stop that lands while a list is
    /// waiting for room can leave its head queued and flushed even though
    /// `QueueClosed` is returned for the rest.
    pub async fn store_entry_list(&self, entries: Vec<Entry>) -> Result<(), StorageError> {
        if self.stop.is_cancelled() {
            return Err(StorageError::QueueClosed);
        }
        for entry in entries {
            self.sender
                .send(entry)
                .await
                .map_err(|_| StorageError::QueueClosed)?;
        }
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StorageError> {
        self.storage.ping().await
    }

    /// Ask the writer to flush what it holds and exit. Calling it again is a no-op.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

#[async_trait]
impl EntryStore for EntryQueue {
    async fn ping(&self) -> Result<(), StorageError> {
        EntryQueue::ping(self).await
    }

    async fn store_entry_list(&self, entries: Vec<Entry>) -> Result<(), StorageError> {
        EntryQueue::store_entry_list(self, entries).await
    }
}

impl BatchWriter {
    /// Run until the queue is stopped or every producer is gone.
    pub async fn run(mut self) {
        let mut ticker = interval_at(tokio::time::Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut batch: Vec<Entry> = Vec::new();

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = ticker.tick() => {
                    if batch.is_empty() {
                        continue;
                    }
                    let capacity = batch.len();
                    self.flush(std::mem::replace(&mut batch, Vec::with_capacity(capacity))).await;
                }
                received = self.receiver.recv() => match received {
                    Some(entry) => batch.push(entry),
                    None => break,
                },
            }
        }

        // Refuse new entries, then pick up what producers already queued.
        self.receiver.close();
        while let Some(entry) = self.receiver.recv().await {
            batch.push(entry);
        }
        if !batch.is_empty() {
            self.flush(batch).await;
        }

        info!("batch writer stopped");
    }

    #[instrument(skip_all, fields(batch_size = batch.len()))]
    async fn flush(&self, batch: Vec<Entry>) {
        let start = Instant::now();
        let result = self.storage.insert_entries(&batch).await;
        report_flush(batch.len(), start.elapsed(), result.is_ok());

        match result {
            Ok(()) => debug!("flushed {} entries", batch.len()),
            Err(err) => error!("insert entry list: {}", err),
        }
    }
}
