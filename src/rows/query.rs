use std::sync::Arc;

use super::store::RowStore;
use crate::error::{Result, RowStoreError};
use crate::retry::{retry, RetryPolicy};
use crate::schema::{index_fields, index_name_for};
use crate::types::{PartitionKey, RowQuery, RowRecord};

/// Exact-key lookup of stored rows.
#[derive(Clone)]
pub struct RowQueryService {
    store: Arc<dyn RowStore>,
    retry: RetryPolicy,
}

impl RowQueryService {
    pub fn new(store: Arc<dyn RowStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Rows whose index key equals the query exactly. An empty result is not
    /// an error.
    ///
    /// A composite `index_name` may list its fields in any order as long as
    /// `index_value` follows the same order.
    pub async fn query(&self, query: &RowQuery) -> Result<Vec<RowRecord>> {
        let (index_name, index_value) = canonicalize(query)?;
        let partition = PartitionKey {
            collection: query.collection.clone(),
            schema_name: query.schema_name.clone(),
            index_name,
        };
        let rows = retry(&self.retry, "query rows", || {
            self.store
                .select_rows(&query.owner, &partition, &index_value)
        })
        .await?;
        tracing::debug!(
            "Row query {}/{} {} = {:?}: {} rows",
            query.collection,
            query.schema_name,
            partition.index_name,
            index_value,
            rows.len()
        );
        Ok(rows)
    }
}

/// Validate a query and reorder a composite key into sorted field order.
fn canonicalize(query: &RowQuery) -> Result<(String, Vec<String>)> {
    for (what, value) in [
        ("owner", &query.owner),
        ("collection", &query.collection),
        ("schema_name", &query.schema_name),
        ("index_name", &query.index_name),
    ] {
        if value.trim().is_empty() {
            return Err(RowStoreError::InvalidQuery(format!("{what} is required")));
        }
    }

    let fields = index_fields(&query.index_name);
    if fields.len() != query.index_value.len() {
        return Err(RowStoreError::InvalidQuery(format!(
            "index {} has {} fields but {} values were given",
            query.index_name,
            fields.len(),
            query.index_value.len()
        )));
    }
    if fields.iter().any(|f| f.is_empty()) {
        return Err(RowStoreError::InvalidQuery(format!(
            "malformed index name {:?}",
            query.index_name
        )));
    }

    let mut pairs: Vec<(&str, &String)> = fields.into_iter().zip(&query.index_value).collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    if pairs.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(RowStoreError::InvalidQuery(format!(
            "index {} repeats a field",
            query.index_name
        )));
    }
    let names: Vec<&str> = pairs.iter().map(|(f, _)| *f).collect();
    let values = pairs.into_iter().map(|(_, v)| v.clone()).collect();
    Ok((index_name_for(&names), values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::MemoryRowStore;
    use std::collections::BTreeMap;

    fn query(index_name: &str, values: &[&str]) -> RowQuery {
        RowQuery {
            owner: "alice".into(),
            collection: "crm".into(),
            schema_name: "customers".into(),
            index_name: index_name.into(),
            index_value: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn seeded() -> RowQueryService {
        let store = Arc::new(MemoryRowStore::new());
        let data: BTreeMap<String, String> = [
            ("region".to_string(), "US".to_string()),
            ("status".to_string(), "active".to_string()),
        ]
        .into_iter()
        .collect();
        store
            .insert_row(
                "alice",
                RowRecord {
                    collection: "crm".into(),
                    schema_name: "customers".into(),
                    index_name: "region,status".into(),
                    index_value: vec!["US".into(), "active".into()],
                    data,
                    source: String::new(),
                },
            )
            .await
            .unwrap();
        RowQueryService::new(store, RetryPolicy::none())
    }

    #[tokio::test]
    async fn composite_key_in_either_order() {
        let svc = seeded().await;
        assert_eq!(svc.query(&query("region,status", &["US", "active"])).await.unwrap().len(), 1);
        assert_eq!(svc.query(&query("status,region", &["active", "US"])).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_partial_matching() {
        let svc = seeded().await;
        assert!(svc.query(&query("region,status", &["US", "act"])).await.unwrap().is_empty());
        assert!(svc.query(&query("region", &["US"])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn arity_mismatch_rejected() {
        let svc = seeded().await;
        let err = svc.query(&query("region,status", &["US"])).await.unwrap_err();
        assert!(matches!(err, RowStoreError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn missing_owner_rejected() {
        let svc = seeded().await;
        let mut q = query("region", &["US"]);
        q.owner.clear();
        assert!(matches!(
            svc.query(&q).await.unwrap_err(),
            RowStoreError::InvalidQuery(_)
        ));
    }
}
