//! Cluster topology: membership, routing scope, and candidate ordering.

pub mod live_nodes;
pub mod query_plan;
pub mod scope;

pub use live_nodes::{LiveNodes, MembershipSnapshot};
pub use query_plan::QueryPlan;
pub use scope::RoutingScope;
