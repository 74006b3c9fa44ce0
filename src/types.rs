use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Logical dataset identifier, e.g. `"geo"`.
pub type CollectionId = String;
/// Tenant namespace that scopes vector collections and collection registrations.
pub type OwnerId = String;

/// Provenance and routing metadata shared by every row of an incoming record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Producer-assigned identifier of the source document or batch.
    #[serde(default)]
    pub id: String,
    /// Empty means the service's default owner.
    #[serde(default)]
    pub owner: OwnerId,
    pub collection: CollectionId,
    /// Optional provenance stored with each row; may be empty.
    #[serde(default)]
    pub source: String,
}

/// One structured record as it arrives on the source stream.
///
/// A record may carry several rows that share metadata and schema. Field
/// values are arbitrary JSON scalars; see [`stringify_value`] for how they are
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub metadata: Metadata,
    pub schema_name: String,
    pub values: Vec<IndexMap<String, serde_json::Value>>,
}

impl ExtractedRecord {
    /// A record holding a single row.
    pub fn single(
        metadata: Metadata,
        schema_name: impl Into<String>,
        row: IndexMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            metadata,
            schema_name: schema_name.into(),
            values: vec![row],
        }
    }
}

/// Stored string form of a field value. `null` means the field is absent.
///
/// Strings are kept verbatim; numbers and booleans use their JSON text;
/// arrays and objects are stored as compact JSON.
pub fn stringify_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// One stored copy of a row, keyed by a single index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRecord {
    pub collection: CollectionId,
    pub schema_name: String,
    /// Sorted, comma-joined field names of the index.
    pub index_name: String,
    /// Values aligned with the fields of `index_name`.
    pub index_value: Vec<String>,
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub source: String,
}

impl RowRecord {
    pub fn partition(&self) -> PartitionKey {
        PartitionKey {
            collection: self.collection.clone(),
            schema_name: self.schema_name.clone(),
            index_name: self.index_name.clone(),
        }
    }
}

/// `(collection, schema_name, index_name)`: the unit of bulk deletion and
/// the catalog entry for it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub collection: CollectionId,
    pub schema_name: String,
    pub index_name: String,
}

/// Exact-match lookup of rows by one concrete index key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowQuery {
    /// Keyspace to read from. Empty means the service's default owner.
    #[serde(default)]
    pub owner: OwnerId,
    pub collection: CollectionId,
    pub schema_name: String,
    pub index_name: String,
    pub index_value: Vec<String>,
}

/// Embedding of one distinct index value of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIndexEmbedding {
    pub index_name: String,
    pub index_value: Vec<String>,
    pub text: String,
    pub vectors: Vec<Vec<f32>>,
}

/// A text the compute stage could not embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingFailure {
    pub index_name: String,
    pub index_value: Vec<String>,
    pub text: String,
    pub error: String,
}

/// Output of the compute stage for one source record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowEmbeddings {
    pub metadata: Metadata,
    pub schema_name: String,
    pub embeddings: Vec<RowIndexEmbedding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<EmbeddingFailure>,
}

/// Nearest-neighbour query over the vector collections of one schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowEmbeddingsRequest {
    pub vectors: Vec<Vec<f32>>,
    #[serde(default)]
    pub owner: OwnerId,
    pub collection: CollectionId,
    pub schema_name: String,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// One fuzzy candidate, carrying enough to perform the exact lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIndexMatch {
    pub index_name: String,
    pub index_value: Vec<String>,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Response of the embedding query service. Failures are reported in `error`
/// with an empty match list rather than as a transport-level error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowEmbeddingsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub matches: Vec<RowIndexMatch>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stringify_scalars() {
        assert_eq!(stringify_value(&json!("CHESTNUT ST")), Some("CHESTNUT ST".into()));
        assert_eq!(stringify_value(&json!(42)), Some("42".into()));
        assert_eq!(stringify_value(&json!(1.5)), Some("1.5".into()));
        assert_eq!(stringify_value(&json!(true)), Some("true".into()));
        assert_eq!(stringify_value(&json!(null)), None);
    }

    #[test]
    fn embeddings_request_defaults() {
        let req: RowEmbeddingsRequest = serde_json::from_value(json!({
            "vectors": [[0.1, 0.2]],
            "owner": "alice",
            "collection": "geo",
            "schema_name": "streets"
        }))
        .unwrap();
        assert_eq!(req.limit, 10);
        assert!(req.index_name.is_none());
    }

    #[test]
    fn response_error_serializes_type_field() {
        let resp = RowEmbeddingsResponse {
            error: Some(ErrorInfo {
                kind: "row-embeddings-query-error".into(),
                message: "boom".into(),
            }),
            matches: vec![],
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["error"]["type"], "row-embeddings-query-error");
        assert_eq!(v["matches"], json!([]));
    }

    #[test]
    fn record_metadata_source_optional() {
        let rec: ExtractedRecord = serde_json::from_value(json!({
            "metadata": {"owner": "alice", "collection": "geo"},
            "schema_name": "streets",
            "values": [{"street": "ELM"}]
        }))
        .unwrap();
        assert_eq!(rec.metadata.source, "");
        assert_eq!(rec.values.len(), 1);
    }
}
