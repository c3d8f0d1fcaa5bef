//! Live-node discovery and membership.
//!
//! `LiveNodes` turns a single seed endpoint into a continuously-refreshed
//! pool of node URIs. A background poller asks one known node per tick for
//! the cluster's `/localnodes` view, rebuilding the active and quarantined
//! partitions from the answer. Readers never block: membership is published
//! as an immutable snapshot swapped in whole, and the round-robin cursor is
//! a plain atomic.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::topology::scope::RoutingScope;
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

/// An immutable view of cluster membership at one point in time.
///
/// `active` and `quarantined` are disjoint; before the first successful
/// poll, `active` holds exactly the seed.
#[derive(Debug, Clone)]
pub struct MembershipSnapshot {
    /// Nodes serving user requests, in server-returned order.
    pub active: Vec<Url>,
    /// Nodes removed after a failed poll or absence from a recent
    /// `/localnodes` answer.
    pub quarantined: Vec<Url>,
    /// The scope in effect, possibly weaker than requested.
    pub scope: RoutingScope,
    /// Whether at least one poll has succeeded.
    pub bootstrapped: bool,
}

/// A single `/localnodes` fetch failure. Internal to the poller; the only
/// caller-visible effect is quarantine.
#[derive(Debug, Error)]
enum PollError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Status {0}")]
    Status(StatusCode),
    #[error("Malformed body: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Membership store with a background poller and a round-robin cursor.
pub struct LiveNodes {
    seed: Url,
    requested_scope: RoutingScope,
    update_period: Duration,
    http: reqwest::Client,
    state: parking_lot::RwLock<Arc<MembershipSnapshot>>,
    cursor: AtomicU64,
    poller: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl LiveNodes {
    /// Creates the store with the seed as its only member. Call
    /// [`start`](Self::start) to probe the scope and begin polling.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let seed = config.seed_node.clone();
        if seed.host_str().is_none() {
            return Err(ClientError::InvalidArgument(format!(
                "Seed node {} has no host",
                seed
            )));
        }
        match seed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ClientError::InvalidArgument(format!(
                    "Seed node scheme {} is not http(s)",
                    other
                )));
            }
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        // One persistent connection per node; the pool grows with the
        // discovered node count.
        let builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.poller_timeout)
            .pool_max_idle_per_host(1);
        let http = config
            .tls
            .apply(builder)?
            .build()
            .map_err(|e| ClientError::Configuration(format!("Cannot build poll client: {}", e)))?;

        let initial = MembershipSnapshot {
            active: vec![seed.clone()],
            quarantined: Vec::new(),
            scope: config.scope.clone(),
            bootstrapped: false,
        };
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            seed,
            requested_scope: config.scope.clone(),
            update_period: config.update_period,
            http,
            state: parking_lot::RwLock::new(Arc::new(initial)),
            cursor: AtomicU64::new(0),
            poller: parking_lot::Mutex::new(None),
            shutdown_tx,
        })
    }

    /// Probes the requested scope, performs the bootstrap poll, and spawns
    /// the periodic poller.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.poller.lock().is_some() {
            tracing::warn!("Live nodes poller already started");
            return Ok(());
        }

        let effective = self.pick_supported_scope().await;
        if effective != self.requested_scope {
            tracing::warn!(
                "Requested scope {} unavailable, falling back to {}",
                self.requested_scope,
                effective
            );
        }
        {
            let mut state = self.state.write();
            let mut snapshot = (**state).clone();
            snapshot.scope = effective;
            *state = Arc::new(snapshot);
        }

        let mut poll_index = 0usize;
        self.poll_once(&mut poll_index).await;

        let this = Arc::clone(self);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(this.run_poller(poll_index, shutdown_rx));
        *self.poller.lock() = Some(handle);
        Ok(())
    }

    /// Stops the poller: signals it, waits up to one period for a clean
    /// exit, then aborts.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.poller.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(self.update_period, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Poller did not stop within {:?}, aborting", self.update_period);
                handle.abort();
            }
        }
    }

    /// Returns the next node for a round-robin request. Falls back to the
    /// seed while the active set is empty; never fails.
    pub fn next_as_uri(&self) -> Url {
        let snapshot = self.state.read().clone();
        if snapshot.active.is_empty() {
            return self.seed.clone();
        }
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        snapshot.active[(n % snapshot.active.len() as u64) as usize].clone()
    }

    /// Round-robin selection with a caller-supplied path and query grafted
    /// onto the chosen node.
    pub fn next_as_uri_with(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.next_as_uri();
        url.set_path(path);
        url.set_query(query);
        url
    }

    /// The current membership snapshot.
    pub fn snapshot(&self) -> Arc<MembershipSnapshot> {
        self.state.read().clone()
    }

    /// The active node URIs, in server-returned order.
    pub fn live_nodes(&self) -> Vec<Url> {
        self.state.read().active.clone()
    }

    /// The active node hosts in the textual form the server reported.
    pub fn live_node_hosts(&self) -> Vec<String> {
        self.state
            .read()
            .active
            .iter()
            .filter_map(|uri| uri.host_str().map(str::to_string))
            .collect()
    }

    /// The scope actually in effect after startup probing.
    pub fn effective_scope(&self) -> RoutingScope {
        self.state.read().scope.clone()
    }

    /// Probes whether the server accepts rack/datacenter filtering on
    /// `/localnodes`. The probe carries fixed wildcard values so the answer
    /// reflects the server's capability, not the configured scope: a server
    /// with the feature answers 2xx (usually with an empty list), one
    /// without it rejects the parameters.
    pub async fn check_if_rack_datacenter_feature_is_supported(&self) -> bool {
        let probe = RoutingScope::rack("*", "*");
        match self.fetch_local_nodes(&self.seed, &probe).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Rack/datacenter feature probe failed: {}", e);
                false
            }
        }
    }

    /// Validates that the configured rack/datacenter filter matches at
    /// least one live node.
    pub async fn check_if_rack_datacenter_set_correctly(&self) -> Result<()> {
        if self.requested_scope.is_cluster() {
            return Ok(());
        }
        match self.fetch_local_nodes(&self.seed, &self.requested_scope).await {
            Ok(hosts) if !hosts.is_empty() => Ok(()),
            Ok(_) => Err(ClientError::Configuration(format!(
                "No live nodes match {}",
                self.requested_scope
            ))),
            Err(e) => Err(ClientError::Configuration(format!(
                "Cannot validate {}: {}",
                self.requested_scope, e
            ))),
        }
    }

    /// Walks the scope fallback chain until a level yields at least one
    /// node. Empty answers and client-error rejections weaken the scope;
    /// transport failures keep the requested level so a temporarily
    /// unreachable seed does not erase the filter.
    async fn pick_supported_scope(&self) -> RoutingScope {
        let mut scope = self.requested_scope.clone();
        loop {
            if scope.is_cluster() {
                return scope;
            }
            match self.fetch_local_nodes(&self.seed, &scope).await {
                Ok(hosts) if !hosts.is_empty() => return scope,
                Ok(_) => {
                    tracing::warn!("Scope {} matched no nodes, weakening", scope);
                }
                Err(PollError::Status(status)) if status.is_client_error() => {
                    tracing::warn!("Scope {} rejected ({}), weakening", scope, status);
                }
                Err(e) => {
                    tracing::warn!("Scope probe for {} failed ({}), keeping it", scope, e);
                    return scope;
                }
            }
            scope = scope.fallback().unwrap_or(RoutingScope::Cluster);
        }
    }

    async fn run_poller(self: Arc<Self>, mut poll_index: usize, mut shutdown: watch::Receiver<bool>) {
        // Stagger the first periodic tick so simultaneously-started clients
        // do not align against the same node.
        let period_ms = self.update_period.as_millis().max(1) as u64;
        let jitter = Duration::from_millis(rand::random::<u64>() % period_ms);
        tokio::select! {
            _ = tokio::time::sleep(jitter) => {}
            _ = shutdown.changed() => return,
        }

        let start = tokio::time::Instant::now() + self.update_period;
        let mut ticker = tokio::time::interval_at(start, self.update_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_once(&mut poll_index).await,
                _ = shutdown.changed() => {
                    tracing::debug!("Live nodes poller stopping");
                    return;
                }
            }
        }
    }

    /// One poller tick: contact the next known node and fold its answer
    /// into membership.
    async fn poll_once(&self, poll_index: &mut usize) {
        let snapshot = self.snapshot();
        let union: Vec<Url> = snapshot
            .active
            .iter()
            .chain(snapshot.quarantined.iter())
            .cloned()
            .collect();
        if union.is_empty() {
            return;
        }
        let target = union[*poll_index % union.len()].clone();
        *poll_index = poll_index.wrapping_add(1);

        match self.fetch_local_nodes(&target, &snapshot.scope).await {
            Ok(hosts) if hosts.is_empty() => {
                // An empty mid-life answer means the filter matched nothing
                // right now; existing membership stays.
                tracing::debug!("Empty /localnodes answer from {}, keeping membership", target);
            }
            Ok(hosts) => {
                let next = merge_membership(&snapshot, &hosts);
                tracing::debug!(
                    "Membership refreshed from {}: {} active, {} quarantined",
                    target,
                    next.active.len(),
                    next.quarantined.len()
                );
                self.publish(next);
            }
            Err(e) => {
                tracing::debug!("Poll of {} failed: {}", target, e);
                if let Some(next) = quarantine_node(&snapshot, &target) {
                    tracing::info!("Quarantining {} after failed poll", target);
                    self.publish(next);
                }
            }
        }
    }

    /// Fetches `/localnodes` from one node and maps the returned hosts to
    /// URIs that keep the seed's scheme and port.
    async fn fetch_local_nodes(
        &self,
        node: &Url,
        scope: &RoutingScope,
    ) -> std::result::Result<Vec<Url>, PollError> {
        let mut url = node.clone();
        url.set_path("/localnodes");
        url.set_query(None);

        let mut request = self.http.get(url);
        let params = scope.query_params();
        if !params.is_empty() {
            request = request.query(&params);
        }

        let response = request.send().await?;
        let status = response.status();
        // Drain the body on every outcome so the keep-alive connection
        // returns to the pool.
        let body = response.bytes().await;
        if !status.is_success() {
            return Err(PollError::Status(status));
        }
        let body = body?;
        let hosts: Vec<String> = serde_json::from_slice(&body)?;

        let mut nodes = Vec::with_capacity(hosts.len());
        for host in &hosts {
            let mut url = self.seed.clone();
            match url.set_host(Some(host)) {
                Ok(()) => nodes.push(url),
                Err(e) => tracing::warn!("Ignoring unusable host {:?}: {}", host, e),
            }
        }
        Ok(nodes)
    }

    fn publish(&self, snapshot: MembershipSnapshot) {
        *self.state.write() = Arc::new(snapshot);
    }
}

/// Folds a successful `/localnodes` answer into the previous membership:
/// returned hosts are active in server order; every previously-known host
/// missing from the answer is quarantined; quarantined hosts that reappear
/// become active again.
fn merge_membership(previous: &MembershipSnapshot, discovered: &[Url]) -> MembershipSnapshot {
    let mut active: Vec<Url> = Vec::with_capacity(discovered.len());
    for node in discovered {
        if !active.contains(node) {
            active.push(node.clone());
        }
    }

    let mut quarantined = Vec::new();
    for known in previous.active.iter().chain(previous.quarantined.iter()) {
        if !active.contains(known) && !quarantined.contains(known) {
            quarantined.push(known.clone());
        }
    }

    MembershipSnapshot {
        active,
        quarantined,
        scope: previous.scope.clone(),
        bootstrapped: true,
    }
}

/// Moves a node whose poll failed from active to quarantined. Returns
/// `None` when membership is unchanged: the node was not active, or it is
/// the last active node and must not be demoted.
fn quarantine_node(previous: &MembershipSnapshot, failed: &Url) -> Option<MembershipSnapshot> {
    if !previous.active.contains(failed) {
        return None;
    }
    if previous.active.len() == 1 {
        return None;
    }

    let active: Vec<Url> = previous
        .active
        .iter()
        .filter(|n| *n != failed)
        .cloned()
        .collect();
    let mut quarantined = previous.quarantined.clone();
    quarantined.push(failed.clone());

    Some(MembershipSnapshot {
        active,
        quarantined,
        scope: previous.scope.clone(),
        bootstrapped: previous.bootstrapped,
    })
}

#[cfg(test)]
impl LiveNodes {
    /// Builds a store with a fixed membership and no poller.
    pub(crate) fn fixed_for_test(
        seed: &str,
        active: &[&str],
        quarantined: &[&str],
    ) -> Arc<LiveNodes> {
        let seed = Url::parse(seed).unwrap();
        let config = ClientConfig::new(seed);
        let nodes = LiveNodes::new(&config).unwrap();
        nodes.publish(MembershipSnapshot {
            active: active.iter().map(|u| Url::parse(u).unwrap()).collect(),
            quarantined: quarantined.iter().map(|u| Url::parse(u).unwrap()).collect(),
            scope: RoutingScope::Cluster,
            bootstrapped: true,
        });
        Arc::new(nodes)
    }
}
