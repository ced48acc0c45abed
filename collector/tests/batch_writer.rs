mod common;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use collector::queue::entry_queue;
use common::{assert_or_retry, MemoryStorage, TestHarness};

#[tokio::test]
async fn requests_are_flushed_on_the_next_tick() {
    let storage = Arc::new(MemoryStorage::default());
    let (queue, writer) = entry_queue(
        storage.clone(),
        NonZeroUsize::new(100).unwrap(),
        Duration::from_millis(50),
    );
    let writer = tokio::spawn(writer.run());
    let harness = TestHarness::new(Arc::new(queue.clone()));

    let response = harness
        .post("/api/v1/store/list", r#"[{"n":1},{"n":2},{"n":3}]"#)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let check_storage = storage.clone();
    assert_or_retry(
        || {
            let storage = check_storage.clone();
            async move { storage.batches().concat().len() == 3 }
        },
        Duration::from_secs(5),
    )
    .await;

    let values: Vec<f64> = storage
        .batches()
        .concat()
        .iter()
        .flat_map(|entry| entry.float_values.clone())
        .collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);

    queue.stop();
    writer.await.unwrap();
}

#[tokio::test]
async fn stop_flushes_pending_entries_and_rejects_new_ones() {
    let storage = Arc::new(MemoryStorage::default());
    let (queue, writer) = entry_queue(
        storage.clone(),
        NonZeroUsize::new(100).unwrap(),
        Duration::from_secs(3600),
    );
    let writer = tokio::spawn(writer.run());
    let harness = TestHarness::new(Arc::new(queue.clone()));

    for _ in 0..5 {
        let response = harness.post("/api/v1/store", r#"{"message":"m"}"#).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert!(storage.batches().is_empty());

    queue.stop();
    writer.await.unwrap();

    let batches = storage.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 5);

    let response = harness.post("/api/v1/store", "{}").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn full_queue_times_out_the_request() {
    let storage = Arc::new(MemoryStorage::default());
    // The writer is never started, so nothing drains the queue.
    let (queue, _writer) = entry_queue(
        storage.clone(),
        NonZeroUsize::new(1).unwrap(),
        Duration::from_secs(3600),
    );
    let harness = TestHarness::with_timeout(Arc::new(queue), Duration::from_millis(100));

    let response = harness.post("/api/v1/store", r#"{"n":1}"#).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = tokio::time::timeout(
        Duration::from_secs(5),
        harness.post("/api/v1/store", r#"{"n":2}"#),
    )
    .await
    .expect("request should not hang on a full queue");
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(storage.batches().is_empty());
}
