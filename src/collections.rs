use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RowStoreError};

/// A collection known to the collection-management layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub owner: String,
    pub collection: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Registry of `(owner, collection)` pairs.
///
/// With enforcement on, writers refuse records for unregistered collections
/// and the embedding stages drop them. With enforcement off every collection
/// is treated as existing.
#[derive(Debug, Default)]
pub struct CollectionRegistry {
    collections: DashMap<(String, String), CollectionInfo>,
    enforce: bool,
}

impl CollectionRegistry {
    pub fn new(enforce: bool) -> Self {
        Self {
            collections: DashMap::new(),
            enforce,
        }
    }

    pub fn is_enforced(&self) -> bool {
        self.enforce
    }

    /// Register a collection; re-registering keeps the original creation time.
    pub fn create(
        &self,
        owner: &str,
        collection: &str,
        name: Option<String>,
        description: Option<String>,
        tags: Vec<String>,
    ) -> CollectionInfo {
        let key = (owner.to_string(), collection.to_string());
        let mut entry = self.collections.entry(key).or_insert_with(|| {
            tracing::info!("Collection {}/{} registered", owner, collection);
            CollectionInfo {
                owner: owner.to_string(),
                collection: collection.to_string(),
                name: String::new(),
                description: String::new(),
                tags: Vec::new(),
                created_at: Utc::now(),
            }
        });
        if let Some(name) = name {
            entry.name = name;
        }
        if let Some(description) = description {
            entry.description = description;
        }
        if !tags.is_empty() {
            entry.tags = tags;
        }
        entry.clone()
    }

    pub fn get(&self, owner: &str, collection: &str) -> Option<CollectionInfo> {
        self.collections
            .get(&(owner.to_string(), collection.to_string()))
            .map(|c| c.clone())
    }

    /// Whether records for this collection may be processed.
    pub fn exists(&self, owner: &str, collection: &str) -> bool {
        !self.enforce
            || self
                .collections
                .contains_key(&(owner.to_string(), collection.to_string()))
    }

    /// Error unless records for this collection may be processed.
    pub fn require(&self, owner: &str, collection: &str) -> Result<()> {
        if self.exists(owner, collection) {
            Ok(())
        } else {
            Err(RowStoreError::CollectionNotFound {
                owner: owner.to_string(),
                collection: collection.to_string(),
            })
        }
    }

    pub fn remove(&self, owner: &str, collection: &str) -> bool {
        self.collections
            .remove(&(owner.to_string(), collection.to_string()))
            .is_some()
    }

    pub fn list(&self, owner: &str) -> Vec<CollectionInfo> {
        let sorted: BTreeMap<String, CollectionInfo> = self
            .collections
            .iter()
            .filter(|e| e.key().0 == owner)
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();
        sorted.into_values().collect()
    }

    /// Every registered collection, for snapshots.
    pub fn export(&self) -> Vec<CollectionInfo> {
        let mut all: Vec<CollectionInfo> = self.collections.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| (&a.owner, &a.collection).cmp(&(&b.owner, &b.collection)));
        all
    }

    pub fn import(&self, infos: Vec<CollectionInfo>) {
        for info in infos {
            self.collections
                .insert((info.owner.clone(), info.collection.clone()), info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unenforced_registry_accepts_everything() {
        let reg = CollectionRegistry::new(false);
        assert!(reg.exists("alice", "geo"));
        assert!(reg.require("alice", "geo").is_ok());
    }

    #[test]
    fn enforced_registry_requires_creation() {
        let reg = CollectionRegistry::new(true);
        assert!(matches!(
            reg.require("alice", "geo"),
            Err(RowStoreError::CollectionNotFound { .. })
        ));
        reg.create("alice", "geo", None, None, vec![]);
        assert!(reg.exists("alice", "geo"));
        assert!(!reg.exists("bob", "geo"));
    }

    #[test]
    fn recreate_keeps_created_at_and_updates_fields() {
        let reg = CollectionRegistry::new(true);
        let first = reg.create("alice", "geo", None, None, vec![]);
        let second = reg.create("alice", "geo", Some("Geo".into()), None, vec!["maps".into()]);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.name, "Geo");
        assert_eq!(second.tags, vec!["maps"]);
    }

    #[test]
    fn list_is_scoped_and_sorted() {
        let reg = CollectionRegistry::new(true);
        reg.create("alice", "zeta", None, None, vec![]);
        reg.create("alice", "alpha", None, None, vec![]);
        reg.create("bob", "beta", None, None, vec![]);
        let names: Vec<String> = reg.list("alice").into_iter().map(|c| c.collection).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn export_import_round_trip() {
        let reg = CollectionRegistry::new(true);
        reg.create("alice", "geo", None, None, vec![]);
        let other = CollectionRegistry::new(true);
        other.import(reg.export());
        assert!(other.exists("alice", "geo"));
        assert!(other.remove("alice", "geo"));
        assert!(!other.exists("alice", "geo"));
    }
}
