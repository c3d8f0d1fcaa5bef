//! Client configuration.

use crate::error::{ClientError, Result};
use crate::partition::classifier::AffinityMode;
use crate::topology::scope::RoutingScope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default poller period.
pub const DEFAULT_UPDATE_PERIOD: Duration = Duration::from_millis(10_000);

/// Default per-poll HTTP timeout.
pub const DEFAULT_POLLER_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Configuration for the routing core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// The seed node the client bootstraps from.
    pub seed_node: Url,

    /// How often the poller refreshes membership.
    pub update_period: Duration,

    /// Requested routing scope; may weaken at startup if the server cannot
    /// honor it.
    pub scope: RoutingScope,

    /// Key-affinity routing mode.
    pub key_affinity: AffinityMode,

    /// Pre-seeded partition-key names, keyed by table; skips discovery.
    pub pk_info_per_table: HashMap<String, String>,

    /// Per-poll HTTP timeout.
    pub poller_timeout: Duration,

    /// TLS trust configuration for the HTTP clients the core owns.
    pub tls: TlsConfig,
}

impl ClientConfig {
    pub fn new(seed_node: Url) -> Self {
        Self {
            seed_node,
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            seed_node: Url::parse("http://127.0.0.1:8000")
                .expect("default seed URL is well-formed"),
            update_period: DEFAULT_UPDATE_PERIOD,
            scope: RoutingScope::Cluster,
            key_affinity: AffinityMode::Disabled,
            pk_info_per_table: HashMap::new(),
            poller_timeout: DEFAULT_POLLER_TIMEOUT,
            tls: TlsConfig::System,
        }
    }
}

/// TLS trust configuration, consumed when building HTTP clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum TlsConfig {
    /// Trust the system root store.
    #[default]
    System,
    /// Accept any server certificate. Test clusters only.
    TrustAll,
    /// Trust an explicit CA bundle in PEM form.
    CustomCa { pem_path: PathBuf },
}

impl TlsConfig {
    /// Applies this trust configuration to a reqwest client builder.
    pub(crate) fn apply(&self, builder: reqwest::ClientBuilder) -> Result<reqwest::ClientBuilder> {
        match self {
            TlsConfig::System => Ok(builder),
            TlsConfig::TrustAll => Ok(builder.danger_accept_invalid_certs(true)),
            TlsConfig::CustomCa { pem_path } => {
                let pem = std::fs::read(pem_path).map_err(|e| {
                    ClientError::Configuration(format!(
                        "Cannot read CA bundle {}: {}",
                        pem_path.display(),
                        e
                    ))
                })?;
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| ClientError::Configuration(format!("Invalid CA bundle: {}", e)))?;
                Ok(builder.add_root_certificate(cert))
            }
        }
    }
}
