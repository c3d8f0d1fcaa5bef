//! Routing scope: which slice of the cluster the client routes to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The rack/datacenter/cluster filter applied to discovered nodes.
///
/// Scopes weaken along a fixed chain: a rack filter falls back to its
/// datacenter, a datacenter filter falls back to the whole cluster. The
/// effective scope may end up weaker than requested when the server cannot
/// honor the filter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "lowercase")]
pub enum RoutingScope {
    /// No filtering; every cluster node is eligible.
    #[default]
    Cluster,
    /// Only nodes in the given datacenter.
    Datacenter { dc: String },
    /// Only nodes in the given rack of the given datacenter.
    Rack { dc: String, rack: String },
}

impl RoutingScope {
    pub fn datacenter(dc: impl Into<String>) -> Self {
        RoutingScope::Datacenter { dc: dc.into() }
    }

    pub fn rack(dc: impl Into<String>, rack: impl Into<String>) -> Self {
        RoutingScope::Rack {
            dc: dc.into(),
            rack: rack.into(),
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, RoutingScope::Cluster)
    }

    /// The next weaker scope, or `None` for `Cluster`.
    pub fn fallback(&self) -> Option<RoutingScope> {
        match self {
            RoutingScope::Rack { dc, .. } => Some(RoutingScope::Datacenter { dc: dc.clone() }),
            RoutingScope::Datacenter { .. } => Some(RoutingScope::Cluster),
            RoutingScope::Cluster => None,
        }
    }

    /// Query parameters for a `/localnodes` request under this scope.
    pub fn query_params(&self) -> Vec<(&'static str, &str)> {
        match self {
            RoutingScope::Cluster => Vec::new(),
            RoutingScope::Datacenter { dc } => vec![("dc", dc.as_str())],
            RoutingScope::Rack { dc, rack } => vec![("rack", rack.as_str()), ("dc", dc.as_str())],
        }
    }
}

impl fmt::Display for RoutingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingScope::Cluster => write!(f, "cluster"),
            RoutingScope::Datacenter { dc } => write!(f, "datacenter {}", dc),
            RoutingScope::Rack { dc, rack } => write!(f, "rack {}/{}", dc, rack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_chain_terminates_at_cluster() {
        let scope = RoutingScope::rack("dc1", "r1");
        let weaker = scope.fallback().unwrap();
        assert_eq!(weaker, RoutingScope::datacenter("dc1"));
        assert_eq!(weaker.fallback(), Some(RoutingScope::Cluster));
        assert_eq!(RoutingScope::Cluster.fallback(), None);
    }

    #[test]
    fn test_query_params() {
        assert!(RoutingScope::Cluster.query_params().is_empty());
        assert_eq!(
            RoutingScope::datacenter("dc1").query_params(),
            vec![("dc", "dc1")]
        );
        assert_eq!(
            RoutingScope::rack("dc1", "r2").query_params(),
            vec![("rack", "r2"), ("dc", "dc1")]
        );
    }

    #[test]
    fn test_serde_tagging() {
        let scope: RoutingScope =
            serde_json::from_str(r#"{"level":"rack","dc":"dc1","rack":"r1"}"#).unwrap();
        assert_eq!(scope, RoutingScope::rack("dc1", "r1"));

        let cluster: RoutingScope = serde_json::from_str(r#"{"level":"cluster"}"#).unwrap();
        assert!(cluster.is_cluster());
    }
}
