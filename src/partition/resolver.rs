//! Partition-key discovery and caching.
//!
//! Maps table names to their partition-key attribute names. Lookups are
//! non-blocking; unknown tables are resolved by a single-worker background
//! task that issues `DescribeTable` with bounded retries. Discovery never
//! surfaces errors into request paths: until a table's key is known, its
//! requests simply route round-robin.

use crate::error::Result as ClientResult;
use crate::topology::live_nodes::LiveNodes;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

const MAX_ATTEMPTS: u32 = 4;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_millis(2000);
const FAILURE_COOLDOWN: Duration = Duration::from_secs(300);
const DESCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Key schema entry of a table description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: String,
}

/// The slice of `DescribeTable` output the resolver consumes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableDescription {
    #[serde(default)]
    pub key_schema: Vec<KeySchemaElement>,
}

impl TableDescription {
    /// The attribute name of the `HASH` key, if the schema has one.
    pub fn hash_key(&self) -> Option<&str> {
        self.key_schema
            .iter()
            .find(|e| e.key_type == "HASH")
            .map(|e| e.attribute_name.as_str())
    }
}

/// Failure reported by a [`TableMetadataClient`]. Carries enough context
/// for the resolver to tell permanent failures from transient ones.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The request never produced an HTTP response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a structured error.
    #[error("{code} ({status}): {message}")]
    Service {
        status: StatusCode,
        code: String,
        message: String,
    },

    /// Non-2xx answer without a parsable error body.
    #[error("Unexpected status {0}")]
    Status(StatusCode),

    /// 2xx answer that did not parse.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl MetadataError {
    /// Permanent failures are not retried and put the table in cooldown:
    /// missing tables, authorization and validation rejections, and any
    /// other 4xx except 429.
    fn is_permanent(&self) -> bool {
        let (status, code) = match self {
            MetadataError::Service { status, code, .. } => (*status, code.as_str()),
            MetadataError::Status(status) => (*status, ""),
            _ => return false,
        };
        if status == StatusCode::FORBIDDEN {
            return true;
        }
        if code.contains("ResourceNotFound")
            || code.contains("AccessDeniedException")
            || code.contains("ValidationException")
        {
            return true;
        }
        status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS
    }
}

impl From<MetadataError> for crate::error::ClientError {
    fn from(e: MetadataError) -> Self {
        crate::error::ClientError::Discovery(e.to_string())
    }
}

/// Source of table metadata, normally a `DescribeTable` round trip.
#[async_trait]
pub trait TableMetadataClient: Send + Sync {
    async fn describe_table(
        &self,
        table: &str,
    ) -> std::result::Result<TableDescription, MetadataError>;
}

/// Record of the most recent discovery failure for a table.
#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    at: Instant,
    permanent: bool,
}

struct ResolverShared {
    cache: DashMap<String, String>,
    failed: DashMap<String, FailureRecord>,
    in_progress: DashSet<String>,
}

struct DiscoveryJob {
    table: String,
    client: Arc<dyn TableMetadataClient>,
}

/// Cache of partition-key attribute names with background discovery.
pub struct PartitionKeyResolver {
    shared: Arc<ResolverShared>,
    jobs: parking_lot::Mutex<Option<mpsc::UnboundedSender<DiscoveryJob>>>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl PartitionKeyResolver {
    /// Creates the resolver and spawns its discovery worker. Must be
    /// called within a tokio runtime.
    pub fn new() -> Self {
        Self::with_preseeded(std::iter::empty())
    }

    /// Creates the resolver with pre-seeded `table -> partition key`
    /// entries that skip discovery entirely.
    pub fn with_preseeded(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        let shared = Arc::new(ResolverShared {
            cache: entries.into_iter().collect(),
            failed: DashMap::new(),
            in_progress: DashSet::new(),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(Arc::clone(&shared), rx));
        Self {
            shared,
            jobs: parking_lot::Mutex::new(Some(tx)),
            worker: parking_lot::Mutex::new(Some(worker)),
        }
    }

    /// Non-blocking lookup of a table's partition-key attribute name.
    pub fn get(&self, table: &str) -> Option<String> {
        self.shared.cache.get(table).map(|entry| entry.clone())
    }

    /// Manually seeds a table's partition-key name and clears any failure
    /// record.
    pub fn register(&self, table: impl Into<String>, pk_name: impl Into<String>) {
        let table = table.into();
        self.shared.failed.remove(&table);
        self.shared.cache.insert(table, pk_name.into());
    }

    pub fn has_info(&self, table: &str) -> bool {
        self.shared.cache.contains_key(table)
    }

    /// Whether the table sits in the post-permanent-failure cooldown
    /// window.
    pub fn is_in_failure_cooldown(&self, table: &str) -> bool {
        self.shared
            .failed
            .get(table)
            .map(|record| record.permanent && record.at.elapsed() < FAILURE_COOLDOWN)
            .unwrap_or(false)
    }

    /// Drops the failure record for a table, allowing rediscovery before
    /// the cooldown expires.
    pub fn clear_failure(&self, table: &str) {
        self.shared.failed.remove(table);
    }

    /// The timestamp and permanence of the last recorded discovery
    /// failure, if any.
    pub fn failure_recorded_at(&self, table: &str) -> Option<(Instant, bool)> {
        self.shared
            .failed
            .get(table)
            .map(|record| (record.at, record.permanent))
    }

    /// Schedules asynchronous discovery for a table. Idempotent: no-ops
    /// when the key is already cached, discovery is already in flight, or
    /// the table is in failure cooldown.
    pub fn trigger_discovery(&self, table: &str, client: Arc<dyn TableMetadataClient>) {
        if self.shared.cache.contains_key(table) {
            return;
        }
        if self.is_in_failure_cooldown(table) {
            return;
        }
        if !self.shared.in_progress.insert(table.to_string()) {
            return;
        }

        let job = DiscoveryJob {
            table: table.to_string(),
            client,
        };
        let sent = self
            .jobs
            .lock()
            .as_ref()
            .map(|tx| tx.send(job).is_ok())
            .unwrap_or(false);
        if !sent {
            tracing::debug!("Discovery worker unavailable, dropping job for {}", table);
            self.shared.in_progress.remove(table);
        }
    }

    /// Stops the discovery worker, giving it 5 seconds to drain before
    /// aborting.
    pub async fn shutdown(&self) {
        drop(self.jobs.lock().take());
        let handle = self.worker.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(Duration::from_secs(5), &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Discovery worker did not stop in time, aborting");
                handle.abort();
            }
        }
    }
}

impl Default for PartitionKeyResolver {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_worker(shared: Arc<ResolverShared>, mut rx: mpsc::UnboundedReceiver<DiscoveryJob>) {
    while let Some(job) = rx.recv().await {
        // Re-check after holding the in-progress token: a concurrent
        // register may have landed while the job sat in the queue.
        if !shared.cache.contains_key(&job.table) {
            discover(&shared, &job).await;
        }
        shared.in_progress.remove(&job.table);
    }
}

async fn discover(shared: &ResolverShared, job: &DiscoveryJob) {
    let mut delay = INITIAL_RETRY_DELAY;
    let mut last_error = None;

    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(MAX_RETRY_DELAY);
        }

        match job.client.describe_table(&job.table).await {
            Ok(description) => match description.hash_key() {
                Some(pk_name) => {
                    tracing::info!("Discovered partition key {} for {}", pk_name, job.table);
                    shared.failed.remove(&job.table);
                    shared.cache.insert(job.table.clone(), pk_name.to_string());
                    return;
                }
                None => {
                    tracing::warn!("Table {} has no HASH key, not retrying", job.table);
                    record_failure(shared, &job.table, true);
                    return;
                }
            },
            Err(e) if e.is_permanent() => {
                tracing::warn!("Discovery for {} failed permanently: {}", job.table, e);
                record_failure(shared, &job.table, true);
                return;
            }
            Err(e) => {
                tracing::debug!(
                    "Discovery attempt {}/{} for {} failed: {}",
                    attempt,
                    MAX_ATTEMPTS,
                    job.table,
                    e
                );
                last_error = Some(e);
            }
        }
    }

    if let Some(e) = last_error {
        tracing::debug!("Discovery for {} exhausted retries: {}", job.table, e);
    }
    record_failure(shared, &job.table, false);
}

fn record_failure(shared: &ResolverShared, table: &str, permanent: bool) {
    shared.failed.insert(
        table.to_string(),
        FailureRecord {
            at: Instant::now(),
            permanent,
        },
    );
}

enum MetadataTarget {
    Pool(Arc<LiveNodes>),
    Fixed(Url),
}

/// `TableMetadataClient` that issues the raw `DescribeTable` JSON call
/// against live cluster nodes.
pub struct HttpTableMetadataClient {
    http: reqwest::Client,
    target: MetadataTarget,
}

impl HttpTableMetadataClient {
    /// Targets whichever node round-robin selection yields, so discovery
    /// rides the same membership it serves.
    pub fn new(live_nodes: Arc<LiveNodes>, tls: &crate::config::TlsConfig) -> ClientResult<Self> {
        Self::build(MetadataTarget::Pool(live_nodes), tls)
    }

    /// Targets one fixed endpoint.
    pub fn with_endpoint(endpoint: Url, tls: &crate::config::TlsConfig) -> ClientResult<Self> {
        Self::build(MetadataTarget::Fixed(endpoint), tls)
    }

    fn build(target: MetadataTarget, tls: &crate::config::TlsConfig) -> ClientResult<Self> {
        let builder = reqwest::Client::builder().timeout(DESCRIBE_TIMEOUT);
        let http = tls.apply(builder)?.build().map_err(|e| {
            crate::error::ClientError::Configuration(format!(
                "Cannot build metadata client: {}",
                e
            ))
        })?;
        Ok(Self { http, target })
    }

    fn endpoint(&self) -> Url {
        match &self.target {
            MetadataTarget::Pool(nodes) => nodes.next_as_uri(),
            MetadataTarget::Fixed(endpoint) => endpoint.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeTableResponse {
    table: TableDescription,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(rename = "__type")]
    error_type: String,
    #[serde(alias = "Message")]
    message: Option<String>,
}

#[async_trait]
impl TableMetadataClient for HttpTableMetadataClient {
    async fn describe_table(
        &self,
        table: &str,
    ) -> std::result::Result<TableDescription, MetadataError> {
        let body = serde_json::json!({ "TableName": table }).to_string();
        let response = self
            .http
            .post(self.endpoint())
            .header("Content-Type", "application/x-amz-json-1.0")
            .header("X-Amz-Target", "DynamoDB_20120810.DescribeTable")
            .body(body)
            .send()
            .await
            .map_err(|e| MetadataError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MetadataError::Transport(e.to_string()))?;

        if status.is_success() {
            let parsed: DescribeTableResponse = serde_json::from_slice(&bytes)
                .map_err(|e| MetadataError::Malformed(e.to_string()))?;
            return Ok(parsed.table);
        }

        match serde_json::from_slice::<WireError>(&bytes) {
            Ok(wire) => {
                let code = wire
                    .error_type
                    .rsplit('#')
                    .next()
                    .unwrap_or(&wire.error_type)
                    .to_string();
                Err(MetadataError::Service {
                    status,
                    code,
                    message: wire.message.unwrap_or_default(),
                })
            }
            Err(_) => Err(MetadataError::Status(status)),
        }
    }
}
