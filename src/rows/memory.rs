use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::store::RowStore;
use crate::error::Result;
use crate::types::{PartitionKey, RowRecord};

const SNAPSHOT_FILE: &str = "rows.json";

type PartitionRows = BTreeMap<Vec<String>, RowRecord>;

/// In-memory `RowStore`, keyed exactly like the wide-column tables it stands
/// in for.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    rows: DashMap<(String, PartitionKey), PartitionRows>,
    partitions: DashMap<(String, String), BTreeSet<(String, String)>>,
}

#[derive(Serialize, Deserialize)]
struct KeyspaceSnapshot {
    rows: Vec<RowRecord>,
    partitions: Vec<PartitionKey>,
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    keyspaces: BTreeMap<String, KeyspaceSnapshot>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total stored row copies across all keyspaces.
    pub fn row_count(&self) -> usize {
        self.rows.iter().map(|p| p.value().len()).sum()
    }

    /// Partition keys that hold rows in a keyspace, whether or not the
    /// catalog knows about them.
    pub fn stored_partitions(&self, keyspace: &str) -> Vec<PartitionKey> {
        let mut keys: Vec<PartitionKey> = self
            .rows
            .iter()
            .filter(|e| e.key().0 == keyspace && !e.value().is_empty())
            .map(|e| e.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let mut snapshot = Snapshot::default();
        for entry in self.rows.iter() {
            let ks = snapshot
                .keyspaces
                .entry(entry.key().0.clone())
                .or_insert_with(|| KeyspaceSnapshot {
                    rows: Vec::new(),
                    partitions: Vec::new(),
                });
            ks.rows.extend(entry.value().values().cloned());
        }
        for entry in self.partitions.iter() {
            let (keyspace, collection) = entry.key();
            let ks = snapshot
                .keyspaces
                .entry(keyspace.clone())
                .or_insert_with(|| KeyspaceSnapshot {
                    rows: Vec::new(),
                    partitions: Vec::new(),
                });
            ks.partitions
                .extend(entry.value().iter().map(|(schema_name, index_name)| PartitionKey {
                    collection: collection.clone(),
                    schema_name: schema_name.clone(),
                    index_name: index_name.clone(),
                }));
        }
        let json = serde_json::to_string(&snapshot)?;
        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
        tracing::info!("Saved row snapshot: {} rows", self.row_count());
        Ok(())
    }

    /// Load `{dir}/rows.json`; a missing file yields an empty store.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SNAPSHOT_FILE);
        let store = Self::new();
        if !path.exists() {
            return Ok(store);
        }
        let snapshot: Snapshot = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        for (keyspace, ks) in snapshot.keyspaces {
            for row in ks.rows {
                store.put_row(&keyspace, row);
            }
            for entry in ks.partitions {
                store.put_entry(&keyspace, &entry);
            }
        }
        tracing::info!("Loaded row snapshot: {} rows", store.row_count());
        Ok(store)
    }

    fn put_row(&self, keyspace: &str, row: RowRecord) {
        self.rows
            .entry((keyspace.to_string(), row.partition()))
            .or_default()
            .insert(row.index_value.clone(), row);
    }

    fn put_entry(&self, keyspace: &str, entry: &PartitionKey) {
        self.partitions
            .entry((keyspace.to_string(), entry.collection.clone()))
            .or_default()
            .insert((entry.schema_name.clone(), entry.index_name.clone()));
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn insert_row(&self, keyspace: &str, row: RowRecord) -> Result<()> {
        self.put_row(keyspace, row);
        Ok(())
    }

    async fn select_rows(
        &self,
        keyspace: &str,
        partition: &PartitionKey,
        index_value: &[String],
    ) -> Result<Vec<RowRecord>> {
        Ok(self
            .rows
            .get(&(keyspace.to_string(), partition.clone()))
            .and_then(|p| p.get(index_value).cloned())
            .into_iter()
            .collect())
    }

    async fn delete_partition(&self, keyspace: &str, partition: &PartitionKey) -> Result<()> {
        self.rows.remove(&(keyspace.to_string(), partition.clone()));
        Ok(())
    }

    async fn insert_partition_entry(&self, keyspace: &str, entry: &PartitionKey) -> Result<()> {
        self.put_entry(keyspace, entry);
        Ok(())
    }

    async fn select_partition_entries(
        &self,
        keyspace: &str,
        collection: &str,
    ) -> Result<Vec<PartitionKey>> {
        Ok(self
            .partitions
            .get(&(keyspace.to_string(), collection.to_string()))
            .map(|set| {
                set.iter()
                    .map(|(schema_name, index_name)| PartitionKey {
                        collection: collection.to_string(),
                        schema_name: schema_name.clone(),
                        index_name: index_name.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_partition_entries(
        &self,
        keyspace: &str,
        collection: &str,
        schema_name: Option<&str>,
    ) -> Result<()> {
        let key = (keyspace.to_string(), collection.to_string());
        match schema_name {
            None => {
                self.partitions.remove(&key);
            }
            Some(schema) => {
                if let Some(mut set) = self.partitions.get_mut(&key) {
                    set.retain(|(s, _)| s != schema);
                }
                self.partitions.remove_if(&key, |_, set| set.is_empty());
            }
        }
        Ok(())
    }
}
