use async_trait::async_trait;

use crate::error::Result;
use crate::types::{PartitionKey, RowRecord};

/// Backing storage for the `rows` and `row_partitions` tables.
///
/// Both tables live in a keyspace per owner. `rows` is partitioned by
/// `(collection, schema_name, index_name)` and clustered by `index_value`;
/// writing a row whose identity already exists replaces it. `row_partitions`
/// is partitioned by `collection` and clustered by `(schema_name, index_name)`.
///
/// Every method is a single network round trip and may fail transiently.
#[async_trait]
pub trait RowStore: Send + Sync + 'static {
    async fn insert_row(&self, keyspace: &str, row: RowRecord) -> Result<()>;

    async fn select_rows(
        &self,
        keyspace: &str,
        partition: &PartitionKey,
        index_value: &[String],
    ) -> Result<Vec<RowRecord>>;

    /// Delete every row of one partition. Deleting an empty partition succeeds.
    async fn delete_partition(&self, keyspace: &str, partition: &PartitionKey) -> Result<()>;

    async fn insert_partition_entry(&self, keyspace: &str, entry: &PartitionKey) -> Result<()>;

    /// Catalog entries of a collection, ordered by `(schema_name, index_name)`.
    async fn select_partition_entries(
        &self,
        keyspace: &str,
        collection: &str,
    ) -> Result<Vec<PartitionKey>>;

    /// Remove catalog entries of a collection, optionally only those of one schema.
    async fn delete_partition_entries(
        &self,
        keyspace: &str,
        collection: &str,
        schema_name: Option<&str>,
    ) -> Result<()>;
}
