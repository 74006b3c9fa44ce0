use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::schema::{SchemaChange, SchemaRegistry};

type CacheKey = (String, String, String);

/// Which `(owner, collection, schema)` triples already have their catalog
/// entries written, and for which index set.
///
/// Entries are evicted when the schema's index set changes, so the next
/// record for that schema registers the new set. Rows written before the
/// change are not re-indexed.
#[derive(Debug)]
pub struct RegistrationCache {
    registered: DashMap<CacheKey, BTreeSet<String>>,
    changes: Option<Mutex<broadcast::Receiver<SchemaChange>>>,
}

impl Default for RegistrationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationCache {
    /// A cache that is only invalidated explicitly.
    pub fn new() -> Self {
        Self {
            registered: DashMap::new(),
            changes: None,
        }
    }

    /// A cache that follows the registry's change notifications.
    pub fn subscribed(schemas: &SchemaRegistry) -> Self {
        Self {
            registered: DashMap::new(),
            changes: Some(Mutex::new(schemas.subscribe())),
        }
    }

    /// Index set registered for the triple, if any.
    pub fn get(&self, owner: &str, collection: &str, schema_name: &str) -> Option<BTreeSet<String>> {
        self.sync();
        self.registered
            .get(&key(owner, collection, schema_name))
            .map(|e| e.clone())
    }

    pub fn mark_registered(
        &self,
        owner: &str,
        collection: &str,
        schema_name: &str,
        index_names: BTreeSet<String>,
    ) {
        self.registered
            .insert(key(owner, collection, schema_name), index_names);
    }

    pub fn invalidate(&self, owner: &str, collection: &str, schema_name: &str) {
        self.registered.remove(&key(owner, collection, schema_name));
    }

    /// Evict every collection's entry for one schema.
    pub fn invalidate_schema(&self, schema_name: &str) {
        self.registered.retain(|(_, _, s), _| s != schema_name);
    }

    /// Evict every schema's entry for one collection.
    pub fn invalidate_collection(&self, owner: &str, collection: &str) {
        self.registered
            .retain(|(o, c, _), _| !(o == owner && c == collection));
    }

    pub fn clear(&self) {
        self.registered.clear();
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Apply every pending schema change notification.
    fn sync(&self) {
        let Some(changes) = &self.changes else {
            return;
        };
        let mut rx = changes.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match rx.try_recv() {
                Ok(change) => {
                    tracing::debug!(
                        "Registration cache: evicting schema {} ({:?})",
                        change.schema_name,
                        change.kind
                    );
                    self.invalidate_schema(&change.schema_name);
                }
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!(
                        "Registration cache missed {} schema changes, clearing",
                        missed
                    );
                    self.clear();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

fn key(owner: &str, collection: &str, schema_name: &str) -> CacheKey {
    (
        owner.to_string(),
        collection.to_string(),
        schema_name.to_string(),
    )
}
