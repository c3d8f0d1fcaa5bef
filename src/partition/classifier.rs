//! Request classification for key-affinity routing.
//!
//! Decides whether an outgoing request qualifies for partition-key routing
//! under the active mode and extracts the partition-key value from its
//! body. Conditional writes and expression-based updates behave
//! transactionally on the server side, so pinning them to one replica
//! keeps the consensus traffic local.

use crate::request::{AttributeAction, DynamoRequest, Operation, RequestBody, ReturnValues};
use crate::value::AttributeValue;
use serde::{Deserialize, Serialize};

/// Key-affinity routing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AffinityMode {
    /// Every request uses round-robin.
    #[default]
    Disabled,
    /// Only read-modify-write requests are pinned by partition key.
    ReadModifyWrite,
    /// All single-item writes are pinned by partition key.
    AnyWrite,
}

/// Decides key-affinity eligibility for outgoing requests.
#[derive(Debug, Clone, Copy)]
pub struct RequestClassifier {
    mode: AffinityMode,
}

impl RequestClassifier {
    pub fn new(mode: AffinityMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> AffinityMode {
        self.mode
    }

    /// Returns true when `request` should be routed by partition key.
    ///
    /// Batch operations span partitions and always fall through to
    /// round-robin, as do all reads.
    pub fn should_apply(&self, request: &DynamoRequest) -> bool {
        match self.mode {
            AffinityMode::Disabled => false,
            AffinityMode::AnyWrite => matches!(
                request.operation,
                Operation::PutItem | Operation::DeleteItem | Operation::UpdateItem
            ),
            AffinityMode::ReadModifyWrite => match request.operation {
                Operation::PutItem | Operation::DeleteItem => {
                    Self::is_conditioned_write(&request.body)
                }
                Operation::UpdateItem => Self::is_read_modify_update(&request.body),
                _ => false,
            },
        }
    }

    /// A put or delete reads back state when it carries a condition, a
    /// legacy `Expected` clause, or asks for pre-image return values.
    fn is_conditioned_write(body: &RequestBody) -> bool {
        body.condition_expression.is_some()
            || !body.expected.is_empty()
            || body.return_values != ReturnValues::None
    }

    /// An update is read-modify-write unless it is a plain overwrite.
    /// `UPDATED_NEW` needs no pre-read and stays round-robin; a legacy
    /// `ADD` always reads, a legacy `DELETE` only when it removes specific
    /// elements (carries a value).
    fn is_read_modify_update(body: &RequestBody) -> bool {
        if body.update_expression.is_some()
            || body.condition_expression.is_some()
            || !body.expected.is_empty()
        {
            return true;
        }
        if matches!(
            body.return_values,
            ReturnValues::AllOld | ReturnValues::UpdatedOld | ReturnValues::AllNew
        ) {
            return true;
        }
        body.attribute_updates.values().any(|update| match update.action {
            Some(AttributeAction::Add) => true,
            Some(AttributeAction::Delete) => update.value.is_some(),
            _ => false,
        })
    }
}

/// Extracts the partition-key value named `pk_name` from the request body:
/// the `Item` map for puts, the `Key` map for everything else.
pub fn extract_partition_key<'a>(
    request: &'a DynamoRequest,
    pk_name: &str,
) -> Option<&'a AttributeValue> {
    match request.operation {
        Operation::PutItem => request.body.item.get(pk_name),
        _ => request.body.key.get(pk_name),
    }
}
