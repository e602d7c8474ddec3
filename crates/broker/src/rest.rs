//! Kafka REST Proxy (v3) producer.
//!
//! Records are produced one at a time with
//! `POST {address}/v3/clusters/{cluster_id}/topics/{topic}/records`. The
//! cluster id is taken from configuration or looked up with
//! `GET {address}/v3/clusters` when the publisher starts.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use coffeebuddy_core::config::BrokerConfig;
use coffeebuddy_core::{EventPublisher, PublishError, RecordHeaders};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherState {
    Idle,
    Running,
    Stopped,
}

impl PublisherState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublisherStatus {
    pub state: PublisherState,
    pub cluster_id: Option<String>,
    pub addresses: Vec<String>,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("at least one broker address is required")]
    NoAddresses,
    #[error("failed to build broker http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug)]
struct Lifecycle {
    state: PublisherState,
    cluster_id: Option<String>,
}

pub struct KafkaRestPublisher {
    client: Client,
    addresses: Vec<String>,
    retry: RetryPolicy,
    lifecycle: Mutex<Lifecycle>,
}

impl KafkaRestPublisher {
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        Self::with_policy(
            config.addresses.clone(),
            config.cluster_id.clone(),
            Duration::from_millis(config.request_timeout_ms),
            RetryPolicy::from(config),
        )
    }

    pub fn with_policy(
        addresses: Vec<String>,
        cluster_id: Option<String>,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, BrokerError> {
        let addresses = addresses
            .into_iter()
            .map(|address| address.trim().trim_end_matches('/').to_owned())
            .filter(|address| !address.is_empty())
            .collect::<Vec<_>>();
        if addresses.is_empty() {
            return Err(BrokerError::NoAddresses);
        }

        let client = Client::builder().timeout(request_timeout).build()?;
        let cluster_id = cluster_id.filter(|id| !id.trim().is_empty());

        Ok(Self {
            client,
            addresses,
            retry,
            lifecycle: Mutex::new(Lifecycle { state: PublisherState::Idle, cluster_id }),
        })
    }

    /// Resolves the cluster id if needed and marks the publisher running.
    /// Calling it on a stopped publisher starts it again.
    pub async fn start(&self) -> Result<(), PublishError> {
        let known_cluster = self.lock_lifecycle().cluster_id.clone();
        let cluster_id = match known_cluster {
            Some(cluster_id) => cluster_id,
            None => self.fetch_cluster_id().await?,
        };

        {
            let mut lifecycle = self.lock_lifecycle();
            lifecycle.cluster_id = Some(cluster_id.clone());
            lifecycle.state = PublisherState::Running;
        }

        info!(
            event_name = "broker.publisher.started",
            cluster_id = %cluster_id,
            addresses = ?self.addresses,
            "broker publisher started"
        );
        Ok(())
    }

    pub fn stop(&self) {
        let previous = {
            let mut lifecycle = self.lock_lifecycle();
            std::mem::replace(&mut lifecycle.state, PublisherState::Stopped)
        };

        info!(
            event_name = "broker.publisher.stopped",
            previous_state = previous.as_str(),
            "broker publisher stopped"
        );
    }

    pub fn status(&self) -> PublisherStatus {
        let lifecycle = self.lock_lifecycle();
        PublisherStatus {
            state: lifecycle.state,
            cluster_id: lifecycle.cluster_id.clone(),
            addresses: self.addresses.clone(),
        }
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        match self.lifecycle.lock() {
            Ok(lifecycle) => lifecycle,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn cluster_for_publish(&self) -> Result<String, PublishError> {
        let (state, known_cluster) = {
            let lifecycle = self.lock_lifecycle();
            (lifecycle.state, lifecycle.cluster_id.clone())
        };

        match (state, known_cluster) {
            (PublisherState::Stopped, _) => Err(PublishError::NotRunning),
            (_, Some(cluster_id)) => Ok(cluster_id),
            (_, None) => {
                let cluster_id = self.fetch_cluster_id().await?;
                let mut lifecycle = self.lock_lifecycle();
                if lifecycle.state == PublisherState::Idle {
                    lifecycle.state = PublisherState::Running;
                }
                Ok(lifecycle.cluster_id.get_or_insert(cluster_id).clone())
            }
        }
    }

    async fn fetch_cluster_id(&self) -> Result<String, PublishError> {
        let response = self
            .send_with_retry("cluster_lookup", |address| {
                self.client.get(format!("{address}/v3/clusters"))
            })
            .await?;

        let clusters = response.json::<ClusterList>().await.map_err(|error| {
            PublishError::Unavailable(format!("invalid cluster list response: {error}"))
        })?;

        clusters
            .data
            .into_iter()
            .map(|cluster| cluster.cluster_id)
            .find(|cluster_id| !cluster_id.is_empty())
            .ok_or_else(|| PublishError::Unavailable("broker reported no clusters".to_owned()))
    }

    async fn send_with_retry<F>(
        &self,
        operation: &'static str,
        build: F,
    ) -> Result<Response, PublishError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let mut last_error = PublishError::Unavailable("no broker request attempted".to_owned());

        for (attempt, address) in (0..self.retry.attempts()).zip(self.addresses.iter().cycle()) {
            match build(address).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let detail = response.text().await.unwrap_or_default();
                    if !is_retryable(status) {
                        return Err(PublishError::Rejected { status: status.as_u16(), detail });
                    }
                    last_error =
                        PublishError::Unavailable(format!("{address} returned {status}: {detail}"));
                }
                Err(error) => {
                    last_error = PublishError::Unavailable(format!("{address}: {error}"));
                }
            }

            warn!(
                event_name = "broker.request.failed",
                operation,
                attempt,
                max_retries = self.retry.max_retries,
                address = %address,
                error = %last_error,
                "broker request failed"
            );

            if attempt < self.retry.max_retries {
                let delay = self.retry.backoff(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl EventPublisher for KafkaRestPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        value: &Value,
        headers: &RecordHeaders,
    ) -> Result<(), PublishError> {
        let cluster_id = self.cluster_for_publish().await?;
        let record = ProduceRequest::new(key, value, headers);

        let response = self
            .send_with_retry("produce", |address| {
                self.client
                    .post(format!("{address}/v3/clusters/{cluster_id}/topics/{topic}/records"))
                    .json(&record)
            })
            .await?;

        // The proxy can report a per-record failure inside a 200 response.
        if let Ok(ack) = response.json::<ProduceAck>().await {
            if let Some(code) = ack.error_code.filter(|code| *code >= 400) {
                return Err(PublishError::Rejected {
                    status: code,
                    detail: ack.message.unwrap_or_default(),
                });
            }
            debug!(
                topic,
                partition_id = ?ack.partition_id,
                offset = ?ack.offset,
                "broker acknowledged record"
            );
        }

        Ok(())
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[derive(Debug, Serialize)]
struct ProduceRequest<'a> {
    key: TypedData<&'a str>,
    value: TypedData<&'a Value>,
    headers: Vec<RecordHeader<'a>>,
}

impl<'a> ProduceRequest<'a> {
    fn new(key: &'a str, value: &'a Value, headers: &'a RecordHeaders) -> Self {
        Self {
            key: TypedData { kind: "STRING", data: key },
            value: TypedData { kind: "JSON", data: value },
            headers: headers
                .iter()
                .map(|(name, value)| RecordHeader { name, value: STANDARD.encode(value) })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TypedData<T> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: T,
}

#[derive(Debug, Serialize)]
struct RecordHeader<'a> {
    name: &'a str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ClusterList {
    #[serde(default)]
    data: Vec<ClusterEntry>,
}

#[derive(Debug, Deserialize)]
struct ClusterEntry {
    cluster_id: String,
}

#[derive(Debug, Deserialize)]
struct ProduceAck {
    error_code: Option<u16>,
    message: Option<String>,
    partition_id: Option<i64>,
    offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{
        extract::{Path, State},
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use coffeebuddy_core::{EventPublisher, PublishError, RecordHeaders};
    use serde_json::{json, Value};

    use super::{BrokerError, KafkaRestPublisher, PublisherState};
    use crate::retry::RetryPolicy;

    #[derive(Clone, Default)]
    struct StubProxy {
        records: Arc<Mutex<Vec<Value>>>,
        cluster_calls: Arc<AtomicUsize>,
        produce_calls: Arc<AtomicUsize>,
        failures_remaining: Arc<AtomicUsize>,
        reject_with: Option<u16>,
        ack_error: Option<u16>,
    }

    async fn list_clusters(State(stub): State<StubProxy>) -> Json<Value> {
        stub.cluster_calls.fetch_add(1, Ordering::SeqCst);
        Json(json!({
            "kind": "KafkaClusterList",
            "data": [{"kind": "KafkaCluster", "cluster_id": "lkc-test"}]
        }))
    }

    async fn produce(
        State(stub): State<StubProxy>,
        Path((cluster_id, topic)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        stub.produce_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(status) = stub.reject_with {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
            return (status, Json(json!({"error_code": status.as_u16(), "message": "rejected"})));
        }
        if stub
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error_code": 503, "message": "leader not available"})),
            );
        }
        if let Some(code) = stub.ack_error {
            return (StatusCode::OK, Json(json!({"error_code": code, "message": "record too large"})));
        }

        stub.records.lock().expect("records lock").push(json!({
            "cluster_id": cluster_id,
            "topic": topic,
            "body": body,
        }));
        (
            StatusCode::OK,
            Json(json!({
                "error_code": 200,
                "cluster_id": cluster_id,
                "topic_name": topic,
                "partition_id": 0,
                "offset": 7
            })),
        )
    }

    async fn spawn_stub(stub: StubProxy) -> String {
        let app = Router::new()
            .route("/v3/clusters", get(list_clusters))
            .route("/v3/clusters/{cluster_id}/topics/{topic}/records", post(produce))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let address = listener.local_addr().expect("stub address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{address}")
    }

    async fn unused_address() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind probe");
        let address = listener.local_addr().expect("probe address");
        drop(listener);
        format!("http://{address}")
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy { max_retries: 2, base_delay_ms: 1, max_delay_ms: 5 }
    }

    fn publisher(addresses: Vec<String>, cluster_id: Option<&str>) -> KafkaRestPublisher {
        KafkaRestPublisher::with_policy(
            addresses,
            cluster_id.map(str::to_owned),
            Duration::from_millis(500),
            fast_retry(),
        )
        .expect("publisher builds")
    }

    fn correlation_headers() -> RecordHeaders {
        RecordHeaders::from([("correlation_id".to_owned(), "U1_1730000000000".to_owned())])
    }

    #[tokio::test]
    async fn start_resolves_cluster_and_publish_sends_typed_record() {
        let stub = StubProxy::default();
        let address = spawn_stub(stub.clone()).await;
        let publisher = publisher(vec![address], None);

        publisher.start().await.expect("start");
        assert_eq!(publisher.status().state, PublisherState::Running);
        assert_eq!(publisher.status().cluster_id.as_deref(), Some("lkc-test"));

        publisher
            .publish("slack.events", "U1", &json!({"event_type": "slash_command"}), &correlation_headers())
            .await
            .expect("publish");

        let records = stub.records.lock().expect("records lock").clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["cluster_id"], "lkc-test");
        assert_eq!(records[0]["topic"], "slack.events");
        assert_eq!(records[0]["body"]["key"], json!({"type": "STRING", "data": "U1"}));
        assert_eq!(
            records[0]["body"]["value"],
            json!({"type": "JSON", "data": {"event_type": "slash_command"}})
        );
        assert_eq!(
            records[0]["body"]["headers"],
            json!([{"name": "correlation_id", "value": STANDARD.encode("U1_1730000000000")}])
        );
    }

    #[tokio::test]
    async fn configured_cluster_skips_lookup() {
        let stub = StubProxy::default();
        let address = spawn_stub(stub.clone()).await;
        let publisher = publisher(vec![address], Some("lkc-configured"));

        publisher.start().await.expect("start");
        publisher
            .publish("slack.events", "U1", &json!({}), &RecordHeaders::new())
            .await
            .expect("publish");

        assert_eq!(stub.cluster_calls.load(Ordering::SeqCst), 0);
        let records = stub.records.lock().expect("records lock").clone();
        assert_eq!(records[0]["cluster_id"], "lkc-configured");
    }

    #[tokio::test]
    async fn idle_publisher_resolves_cluster_on_first_publish() {
        let stub = StubProxy::default();
        let address = spawn_stub(stub.clone()).await;
        let publisher = publisher(vec![address], None);
        assert_eq!(publisher.status().state, PublisherState::Idle);

        publisher
            .publish("slack.events", "U1", &json!({}), &RecordHeaders::new())
            .await
            .expect("publish");
        publisher
            .publish("slack.events", "U2", &json!({}), &RecordHeaders::new())
            .await
            .expect("publish");

        assert_eq!(stub.cluster_calls.load(Ordering::SeqCst), 1);
        assert_eq!(publisher.status().state, PublisherState::Running);
    }

    #[tokio::test]
    async fn stopped_publisher_refuses_to_publish() {
        let stub = StubProxy::default();
        let address = spawn_stub(stub.clone()).await;
        let publisher = publisher(vec![address], Some("lkc-test"));
        publisher.start().await.expect("start");

        publisher.stop();
        let result = publisher.publish("slack.events", "U1", &json!({}), &RecordHeaders::new()).await;

        assert_eq!(result, Err(PublishError::NotRunning));
        assert_eq!(publisher.status().state, PublisherState::Stopped);
        assert_eq!(stub.produce_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let stub = StubProxy { failures_remaining: Arc::new(AtomicUsize::new(2)), ..StubProxy::default() };
        let address = spawn_stub(stub.clone()).await;
        let publisher = publisher(vec![address], Some("lkc-test"));

        publisher
            .publish("slack.events", "U1", &json!({}), &RecordHeaders::new())
            .await
            .expect("third attempt succeeds");

        assert_eq!(stub.produce_calls.load(Ordering::SeqCst), 3);
        assert_eq!(stub.records.lock().expect("records lock").len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_report_unavailable() {
        let stub = StubProxy { failures_remaining: Arc::new(AtomicUsize::new(10)), ..StubProxy::default() };
        let address = spawn_stub(stub.clone()).await;
        let publisher = publisher(vec![address], Some("lkc-test"));

        let result = publisher.publish("slack.events", "U1", &json!({}), &RecordHeaders::new()).await;

        assert!(matches!(result, Err(PublishError::Unavailable(_))));
        assert_eq!(stub.produce_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_rejected_without_retry() {
        let stub = StubProxy { reject_with: Some(404), ..StubProxy::default() };
        let address = spawn_stub(stub.clone()).await;
        let publisher = publisher(vec![address], Some("lkc-test"));

        let result = publisher.publish("missing.topic", "U1", &json!({}), &RecordHeaders::new()).await;

        assert!(matches!(result, Err(PublishError::Rejected { status: 404, .. })));
        assert_eq!(stub.produce_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_code_inside_ok_response_is_a_rejection() {
        let stub = StubProxy { ack_error: Some(413), ..StubProxy::default() };
        let address = spawn_stub(stub.clone()).await;
        let publisher = publisher(vec![address], Some("lkc-test"));

        let result = publisher.publish("slack.events", "U1", &json!({}), &RecordHeaders::new()).await;

        assert_eq!(
            result,
            Err(PublishError::Rejected { status: 413, detail: "record too large".to_owned() })
        );
    }

    #[tokio::test]
    async fn unreachable_address_falls_over_to_next_one() {
        let stub = StubProxy::default();
        let live = spawn_stub(stub.clone()).await;
        let dead = unused_address().await;
        let publisher = publisher(vec![dead, live], Some("lkc-test"));

        publisher
            .publish("slack.events", "U1", &json!({}), &RecordHeaders::new())
            .await
            .expect("second address accepts");

        assert_eq!(stub.records.lock().expect("records lock").len(), 1);
    }

    #[tokio::test]
    async fn start_fails_when_no_broker_is_reachable() {
        let publisher = publisher(vec![unused_address().await], None);

        let result = publisher.start().await;

        assert!(matches!(result, Err(PublishError::Unavailable(_))));
        assert_eq!(publisher.status().state, PublisherState::Idle);
    }

    #[test]
    fn empty_address_list_is_rejected() {
        let result = KafkaRestPublisher::with_policy(
            vec!["  ".to_owned()],
            None,
            Duration::from_millis(100),
            RetryPolicy::none(),
        );

        assert!(matches!(result, Err(BrokerError::NoAddresses)));
    }

    #[test]
    fn trailing_slashes_are_trimmed_from_addresses() {
        let publisher = KafkaRestPublisher::with_policy(
            vec!["http://localhost:8082/".to_owned()],
            None,
            Duration::from_millis(100),
            RetryPolicy::none(),
        )
        .expect("publisher builds");

        assert_eq!(publisher.status().addresses, ["http://localhost:8082"]);
    }
}
