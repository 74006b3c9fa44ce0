use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use super::schema::RowSchema;
use crate::error::Result;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChangeKind {
    Added,
    Removed,
    /// The schema still exists but its set of indexes differs.
    IndexesChanged,
}

/// Notification that a schema's index set changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaChange {
    pub schema_name: String,
    pub kind: SchemaChangeKind,
    pub version: u64,
}

/// Current schema definitions, shared by every stage.
///
/// Mutations that change a schema's index set are published on a broadcast
/// channel; edits that leave the index set alone (descriptions, non-indexed
/// fields) are silent.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<RowSchema>>>,
    version: AtomicU64,
    changes: broadcast::Sender<SchemaChange>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            schemas: RwLock::new(HashMap::new()),
            version: AtomicU64::new(0),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchemaChange> {
        self.changes.subscribe()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn get(&self, name: &str) -> Option<Arc<RowSchema>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn all(&self) -> BTreeMap<String, RowSchema> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), (**v).clone()))
            .collect()
    }

    /// Register or replace one schema under `name`.
    pub fn put(&self, name: &str, schema: RowSchema) -> Result<()> {
        schema.validate()?;
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        let previous = self
            .schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(schema.clone()));

        let kind = match previous {
            None => Some(SchemaChangeKind::Added),
            Some(old) if old.index_names() != schema.index_names() => {
                Some(SchemaChangeKind::IndexesChanged)
            }
            Some(_) => None,
        };
        if let Some(kind) = kind {
            tracing::info!(
                "Schema {} {:?} (version {}): indexes {:?}",
                name,
                kind,
                version,
                schema.index_names()
            );
            self.publish(name, kind, version);
        }
        Ok(())
    }

    /// Remove a schema. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self
            .schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::info!("Schema {} removed (version {})", name, version);
            self.publish(name, SchemaChangeKind::Removed, version);
        }
        removed
    }

    /// Replace the whole schema set from a configuration map of
    /// schema name to schema document.
    ///
    /// Documents that fail to parse are logged and skipped; the rest load.
    /// Returns the number of schemas loaded.
    pub fn load_config(&self, version: u64, config: &BTreeMap<String, serde_json::Value>) -> usize {
        tracing::info!("Loading schema configuration version {}", version);

        let mut parsed: HashMap<String, Arc<RowSchema>> = HashMap::new();
        for (name, doc) in config {
            match RowSchema::from_json(name, doc) {
                Ok(schema) => {
                    tracing::info!(
                        "Loaded schema: {} with {} fields",
                        name,
                        schema.fields.len()
                    );
                    parsed.insert(name.clone(), Arc::new(schema));
                }
                Err(e) => tracing::error!("Failed to parse schema {}: {}", name, e),
            }
        }

        let old = {
            let mut guard = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, parsed.clone())
        };
        self.version.fetch_max(version, Ordering::AcqRel);

        let mut changes = Vec::new();
        for (name, schema) in &parsed {
            match old.get(name) {
                None => changes.push((name.clone(), SchemaChangeKind::Added)),
                Some(prev) if prev.index_names() != schema.index_names() => {
                    changes.push((name.clone(), SchemaChangeKind::IndexesChanged))
                }
                Some(_) => {}
            }
        }
        for name in old.keys().filter(|n| !parsed.contains_key(*n)) {
            changes.push((name.clone(), SchemaChangeKind::Removed));
        }
        changes.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, kind) in changes {
            self.publish(&name, kind, version);
        }

        tracing::info!("Schema configuration loaded: {} schemas", parsed.len());
        parsed.len()
    }

    fn publish(&self, name: &str, kind: SchemaChangeKind, version: u64) {
        // No receivers is fine: nothing has cached registrations yet.
        let _ = self.changes.send(SchemaChange {
            schema_name: name.to_string(),
            kind,
            version,
        });
    }
}
