//! Broker-facing publish contract.
//!
//! Callers hand a topic, a routing key, a structured JSON value and a set of
//! string headers to an [`EventPublisher`]. Implementations own their retry
//! policy; callers only bound how long they are willing to wait.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type RecordHeaders = BTreeMap<String, String>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("publisher is not running")]
    NotRunning,
    #[error("publish timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("broker rejected record with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("event serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PublishError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        value: &Value,
        headers: &RecordHeaders,
    ) -> Result<(), PublishError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishedRecord {
    pub topic: String,
    pub key: String,
    pub value: Value,
    pub headers: RecordHeaders,
}

#[derive(Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _topic: &str,
        _key: &str,
        _value: &Value,
        _headers: &RecordHeaders,
    ) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Keeps every published record in memory, in publish order.
#[derive(Clone, Default)]
pub struct InMemoryEventPublisher {
    records: Arc<Mutex<Vec<PublishedRecord>>>,
}

impl InMemoryEventPublisher {
    pub fn records(&self) -> Vec<PublishedRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(records) => records.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        value: &Value,
        headers: &RecordHeaders,
    ) -> Result<(), PublishError> {
        let record = PublishedRecord {
            topic: topic.to_owned(),
            key: key.to_owned(),
            value: value.clone(),
            headers: headers.clone(),
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        Ok(())
    }
}
