//! Common test utilities for integration tests
//!
//! Provides a scripted entity backend, a delay-recording sleeper and small
//! record builders shared across the integration test files.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use trellis::domain::ports::{EntityApi, Sleeper};
use trellis::services::RetryPolicy;
use trellis::{BackendError, Item, QueryOrchestrator};

/// Build a record from a JSON object literal.
pub fn item(value: Value) -> Item {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// One call observed by [`ScriptedEntityApi`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub entity: String,
    pub query: Option<Value>,
    pub sort: Option<String>,
    pub limit: Option<u32>,
}

/// Entity backend that replays scripted responses.
///
/// Each call pops the next scripted response; once the script is empty every
/// call gets the fallback. An optional latency keeps calls in flight long
/// enough for concurrent callers to overlap.
pub struct ScriptedEntityApi {
    script: Mutex<VecDeque<Result<Vec<Item>, BackendError>>>,
    fallback: Result<Vec<Item>, BackendError>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    recorded: Mutex<Vec<RecordedCall>>,
}

impl ScriptedEntityApi {
    pub fn returning(items: Vec<Item>) -> Self {
        Self::with_fallback(Ok(items))
    }

    pub fn failing(error: BackendError) -> Self {
        Self::with_fallback(Err(error))
    }

    fn with_fallback(fallback: Result<Vec<Item>, BackendError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: None,
            calls: AtomicUsize::new(0),
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Responses served, in order, before falling back.
    pub fn with_script(self, responses: Vec<Result<Vec<Item>, BackendError>>) -> Self {
        *self.script.lock().unwrap() = responses.into();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.recorded.lock().unwrap().clone()
    }

    async fn respond(&self, call: RecordedCall) -> Result<Vec<Item>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.recorded.lock().unwrap().push(call);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl EntityApi for ScriptedEntityApi {
    async fn list(
        &self,
        entity: &str,
        sort: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Item>, BackendError> {
        self.respond(RecordedCall {
            method: "list",
            entity: entity.to_string(),
            query: None,
            sort: sort.map(str::to_string),
            limit,
        })
        .await
    }

    async fn filter(
        &self,
        entity: &str,
        query: &Value,
        sort: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Item>, BackendError> {
        self.respond(RecordedCall {
            method: "filter",
            entity: entity.to_string(),
            query: Some(query.clone()),
            sort: sort.map(str::to_string),
            limit,
        })
        .await
    }
}

/// Sleeper that records requested delays and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Orchestrator with default settings whose backoff sleeps are recorded.
pub fn orchestrator_with_sleeper(
    api: Arc<ScriptedEntityApi>,
) -> (QueryOrchestrator, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let orchestrator = QueryOrchestrator::builder(api)
        .retry_policy(RetryPolicy::default().with_sleeper(sleeper.clone()))
        .build();
    (orchestrator, sleeper)
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
