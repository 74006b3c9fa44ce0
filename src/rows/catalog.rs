use std::sync::Arc;

use super::store::RowStore;
use crate::error::Result;
use crate::types::PartitionKey;

/// Side table of every `(schema_name, index_name)` ever written per
/// collection. Deletion enumerates partitions from here instead of scanning
/// the row table.
#[derive(Clone)]
pub struct PartitionCatalog {
    store: Arc<dyn RowStore>,
}

impl PartitionCatalog {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    /// `(schema_name, index_name)` pairs of a collection, sorted.
    pub async fn list_indexes(&self, owner: &str, collection: &str) -> Result<Vec<(String, String)>> {
        let mut pairs: Vec<(String, String)> = self
            .store
            .select_partition_entries(owner, collection)
            .await?
            .into_iter()
            .map(|e| (e.schema_name, e.index_name))
            .collect();
        pairs.sort();
        pairs.dedup();
        Ok(pairs)
    }

    /// Index names registered for one schema of a collection, sorted.
    pub async fn list_schema_indexes(
        &self,
        owner: &str,
        collection: &str,
        schema_name: &str,
    ) -> Result<Vec<String>> {
        Ok(self
            .list_indexes(owner, collection)
            .await?
            .into_iter()
            .filter(|(s, _)| s == schema_name)
            .map(|(_, i)| i)
            .collect())
    }

    /// Partition keys of a collection, optionally narrowed to one schema.
    pub async fn partitions(
        &self,
        owner: &str,
        collection: &str,
        schema_name: Option<&str>,
    ) -> Result<Vec<PartitionKey>> {
        Ok(self
            .list_indexes(owner, collection)
            .await?
            .into_iter()
            .filter(|(s, _)| schema_name.map_or(true, |name| s == name))
            .map(|(schema_name, index_name)| PartitionKey {
                collection: collection.to_string(),
                schema_name,
                index_name,
            })
            .collect())
    }

    /// Record one entry. Re-registering an existing entry is a no-op.
    pub async fn register(&self, owner: &str, entry: &PartitionKey) -> Result<()> {
        self.store.insert_partition_entry(owner, entry).await
    }

    pub async fn remove(&self, owner: &str, collection: &str, schema_name: Option<&str>) -> Result<()> {
        self.store
            .delete_partition_entries(owner, collection, schema_name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::MemoryRowStore;

    fn entry(schema_name: &str, index_name: &str) -> PartitionKey {
        PartitionKey {
            collection: "crm".into(),
            schema_name: schema_name.into(),
            index_name: index_name.into(),
        }
    }

    #[tokio::test]
    async fn lists_are_sorted_and_scoped() {
        let catalog = PartitionCatalog::new(Arc::new(MemoryRowStore::new()));
        catalog.register("alice", &entry("orders", "id")).await.unwrap();
        catalog.register("alice", &entry("customers", "status")).await.unwrap();
        catalog.register("alice", &entry("customers", "email")).await.unwrap();
        catalog.register("alice", &entry("customers", "email")).await.unwrap();

        assert_eq!(
            catalog.list_indexes("alice", "crm").await.unwrap(),
            vec![
                ("customers".to_string(), "email".to_string()),
                ("customers".to_string(), "status".to_string()),
                ("orders".to_string(), "id".to_string()),
            ]
        );
        assert_eq!(
            catalog.list_schema_indexes("alice", "crm", "customers").await.unwrap(),
            vec!["email", "status"]
        );
        assert!(catalog.list_indexes("bob", "crm").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partitions_narrowed_by_schema() {
        let catalog = PartitionCatalog::new(Arc::new(MemoryRowStore::new()));
        catalog.register("alice", &entry("orders", "id")).await.unwrap();
        catalog.register("alice", &entry("customers", "email")).await.unwrap();
        let keys = catalog.partitions("alice", "crm", Some("orders")).await.unwrap();
        assert_eq!(keys, vec![entry("orders", "id")]);
        assert_eq!(catalog.partitions("alice", "crm", None).await.unwrap().len(), 2);

        catalog.remove("alice", "crm", Some("orders")).await.unwrap();
        assert_eq!(
            catalog.partitions("alice", "crm", None).await.unwrap(),
            vec![entry("customers", "email")]
        );
    }
}
