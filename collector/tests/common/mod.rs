#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderName, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tower::ServiceExt;

use collector::api::BuildInfo;
use collector::auth::TokenAuth;
use collector::entry::Entry;
use collector::router::router;
use collector::service::{EntryService, EntryStore};
use collector::sinks::{Storage, StorageError};

pub const TOKEN: &str = "secret-token";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Records what the service hands over, or fails every call when `down`.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<Entry>>,
    down: bool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn down() -> Arc<Self> {
        Arc::new(Self {
            down: true,
            ..Default::default()
        })
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn ping(&self) -> Result<(), StorageError> {
        if self.down {
            return Err(StorageError::Connection("connection refused".to_owned()));
        }
        Ok(())
    }

    async fn store_entry_list(&self, entries: Vec<Entry>) -> Result<(), StorageError> {
        if self.down {
            return Err(StorageError::QueueClosed);
        }
        self.entries.lock().unwrap().extend(entries);
        Ok(())
    }
}

/// Storage double for the batch writer, keeps every flushed batch.
#[derive(Default)]
pub struct MemoryStorage {
    batches: Mutex<Vec<Vec<Entry>>>,
}

impl MemoryStorage {
    pub fn batches(&self) -> Vec<Vec<Entry>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_entries(&self, entries: &[Entry]) -> Result<(), StorageError> {
        self.batches.lock().unwrap().push(entries.to_vec());
        Ok(())
    }
}

pub struct TestHarness {
    pub router: Router,
}

impl TestHarness {
    pub fn new(store: Arc<dyn EntryStore + Send + Sync>) -> Self {
        Self::with_options(store, TokenAuth::disabled(), None)
    }

    pub fn with_options(
        store: Arc<dyn EntryStore + Send + Sync>,
        auth: TokenAuth,
        ip_header: Option<HeaderName>,
    ) -> Self {
        Self::build(store, auth, ip_header, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(store: Arc<dyn EntryStore + Send + Sync>, timeout: Duration) -> Self {
        Self::build(store, TokenAuth::disabled(), None, timeout)
    }

    fn build(
        store: Arc<dyn EntryStore + Send + Sync>,
        auth: TokenAuth,
        ip_header: Option<HeaderName>,
        request_timeout: Duration,
    ) -> Self {
        let info = BuildInfo {
            service_name: "collector-test".to_owned(),
            version: "1.2.3".to_owned(),
            ..Default::default()
        };
        let router = router(
            EntryService::new(store),
            info,
            auth,
            ip_header,
            request_timeout,
            false,
        );
        Self { router }
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str, body: &str) -> Response<Body> {
        self.request(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_owned()))
                .unwrap(),
        )
        .await
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.request(builder.body(Body::from(body.to_owned())).unwrap())
            .await
    }

    pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .expect("readable body")
            .to_bytes()
            .to_vec()
    }

    pub async fn body_json<T: DeserializeOwned>(response: Response<Body>) -> T {
        serde_json::from_slice(&Self::body_bytes(response).await).expect("json body")
    }
}

/// Poll `check` until it returns true or `limit` elapses.
pub async fn assert_or_retry<F, Fut>(check: F, limit: Duration)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {:?}",
            limit
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
