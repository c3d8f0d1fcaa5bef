//! Partition-key awareness: request classification and key discovery.

pub mod classifier;
pub mod resolver;

pub use classifier::{extract_partition_key, AffinityMode, RequestClassifier};
pub use resolver::{
    HttpTableMetadataClient, MetadataError, PartitionKeyResolver, TableDescription,
    TableMetadataClient,
};
