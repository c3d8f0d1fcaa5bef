//! Narrow request model.
//!
//! The surrounding SDK owns the wire protocol; the routing core only needs
//! to know which operation a request carries and to see the handful of body
//! fields that decide key-affinity eligibility. `RequestBody` mirrors the
//! JSON body field names so a request can be rebuilt from the serialized
//! HTTP form (`X-Amz-Target` header plus JSON payload) of any SDK.

use crate::error::{ClientError, Result};
use crate::value::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Operation carried by an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    PutItem,
    GetItem,
    UpdateItem,
    DeleteItem,
    Query,
    Scan,
    BatchGetItem,
    BatchWriteItem,
    DescribeTable,
    /// Any operation the routing core does not inspect.
    Other(String),
}

impl Operation {
    /// Parses the operation out of an `X-Amz-Target` header value,
    /// e.g. `DynamoDB_20120810.PutItem`.
    pub fn from_target(target: &str) -> Self {
        let name = target.rsplit('.').next().unwrap_or(target);
        match name {
            "PutItem" => Operation::PutItem,
            "GetItem" => Operation::GetItem,
            "UpdateItem" => Operation::UpdateItem,
            "DeleteItem" => Operation::DeleteItem,
            "Query" => Operation::Query,
            "Scan" => Operation::Scan,
            "BatchGetItem" => Operation::BatchGetItem,
            "BatchWriteItem" => Operation::BatchWriteItem,
            "DescribeTable" => Operation::DescribeTable,
            other => Operation::Other(other.to_string()),
        }
    }
}

/// `ReturnValues` request field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnValues {
    #[default]
    None,
    AllOld,
    UpdatedOld,
    AllNew,
    UpdatedNew,
}

/// Action of a legacy `AttributeUpdates` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeAction {
    Put,
    Add,
    Delete,
}

/// A legacy `AttributeUpdates` entry. The wire default action is `PUT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<AttributeAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<AttributeValue>,
}

impl AttributeUpdate {
    pub fn new(action: AttributeAction) -> Self {
        Self {
            action: Some(action),
            value: None,
        }
    }

    pub fn with_value(mut self, value: AttributeValue) -> Self {
        self.value = Some(value);
        self
    }
}

/// The body fields the routing core inspects. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub key: HashMap<String, AttributeValue>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub item: HashMap<String, AttributeValue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_expression: Option<String>,

    /// Legacy conditional-write form; kept opaque, only presence matters.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub expected: HashMap<String, serde_json::Value>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub attribute_updates: HashMap<String, AttributeUpdate>,

    pub return_values: ReturnValues,
}

/// An outgoing request as seen by the routing core.
#[derive(Debug, Clone)]
pub struct DynamoRequest {
    pub operation: Operation,
    pub body: RequestBody,
}

impl DynamoRequest {
    pub fn new(operation: Operation, body: RequestBody) -> Self {
        Self { operation, body }
    }

    /// Rebuilds a request from its serialized HTTP form.
    pub fn from_wire(target: &str, body: &[u8]) -> Result<Self> {
        if target.is_empty() {
            return Err(ClientError::InvalidArgument(
                "Empty operation target".to_string(),
            ));
        }
        let body: RequestBody = serde_json::from_slice(body)?;
        Ok(Self {
            operation: Operation::from_target(target),
            body,
        })
    }

    pub fn table_name(&self) -> Option<&str> {
        self.body.table_name.as_deref()
    }

    // Builder-style constructors for the operations the core classifies.

    pub fn put_item(table: impl Into<String>) -> Self {
        Self::for_table(Operation::PutItem, table)
    }

    pub fn get_item(table: impl Into<String>) -> Self {
        Self::for_table(Operation::GetItem, table)
    }

    pub fn update_item(table: impl Into<String>) -> Self {
        Self::for_table(Operation::UpdateItem, table)
    }

    pub fn delete_item(table: impl Into<String>) -> Self {
        Self::for_table(Operation::DeleteItem, table)
    }

    fn for_table(operation: Operation, table: impl Into<String>) -> Self {
        Self {
            operation,
            body: RequestBody {
                table_name: Some(table.into()),
                ..RequestBody::default()
            },
        }
    }

    pub fn with_item(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.body.item.insert(name.into(), value);
        self
    }

    pub fn with_key(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.body.key.insert(name.into(), value);
        self
    }

    pub fn with_condition_expression(mut self, expression: impl Into<String>) -> Self {
        self.body.condition_expression = Some(expression.into());
        self
    }

    pub fn with_update_expression(mut self, expression: impl Into<String>) -> Self {
        self.body.update_expression = Some(expression.into());
        self
    }

    pub fn with_return_values(mut self, return_values: ReturnValues) -> Self {
        self.body.return_values = return_values;
        self
    }

    pub fn with_attribute_update(
        mut self,
        name: impl Into<String>,
        update: AttributeUpdate,
    ) -> Self {
        self.body.attribute_updates.insert(name.into(), update);
        self
    }

    pub fn with_expected_entry(
        mut self,
        name: impl Into<String>,
        condition: serde_json::Value,
    ) -> Self {
        self.body.expected.insert(name.into(), condition);
        self
    }
}
