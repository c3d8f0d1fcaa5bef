//! Endpoint resolution for outgoing requests.

use crate::routing::context::RequestContext;
use crate::topology::live_nodes::LiveNodes;
use std::sync::Arc;
use url::Url;

/// Resolves the target endpoint for each outgoing request.
///
/// If the request's context carries a key-affinity override, that URI is
/// returned and the slot cleared; otherwise the next round-robin node is
/// used. Resolution is non-blocking and always yields a URI; retry and
/// failover stay with the HTTP layer.
pub struct EndpointProvider {
    live_nodes: Arc<LiveNodes>,
}

impl EndpointProvider {
    pub fn new(live_nodes: Arc<LiveNodes>) -> Self {
        Self { live_nodes }
    }

    pub fn resolve(&self, ctx: &RequestContext) -> Url {
        ctx.take_override()
            .unwrap_or_else(|| self.live_nodes.next_as_uri())
    }
}
