use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RowStoreError};
use crate::types::stringify_value;

fn default_field_type() -> String {
    "string".to_string()
}

/// One column of a row schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: default_field_type(),
            size: 0,
            primary_key: false,
            indexed: false,
            required: false,
            description: String::new(),
            enum_values: Vec::new(),
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// Definition of a row type: its fields and the indexes rows are stored under.
///
/// Every primary-key or `indexed` field is a single-field index; `indexes`
/// adds composite ones. The primary key gets no special treatment beyond that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Vec<String>>,
}

impl RowSchema {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            fields,
            indexes: Vec::new(),
        }
    }

    pub fn with_composite_index(mut self, fields: &[&str]) -> Self {
        self.indexes
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Parse a schema document. The `name` falls back to `default_name` when
    /// the document does not carry one.
    pub fn from_json(default_name: &str, value: &serde_json::Value) -> Result<Self> {
        let mut value = value.clone();
        if let Some(obj) = value.as_object_mut() {
            obj.entry("name")
                .or_insert_with(|| serde_json::Value::String(default_name.to_string()));
        }
        let schema: RowSchema = serde_json::from_value(value)
            .map_err(|e| RowStoreError::InvalidSchema(format!("{default_name}: {e}")))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RowStoreError::InvalidSchema("schema name is empty".into()));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() || field.name.contains(',') {
                return Err(RowStoreError::InvalidSchema(format!(
                    "{}: invalid field name {:?}",
                    self.name, field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(RowStoreError::InvalidSchema(format!(
                    "{}: duplicate field {}",
                    self.name, field.name
                )));
            }
        }
        for composite in &self.indexes {
            if composite.is_empty() {
                return Err(RowStoreError::InvalidSchema(format!(
                    "{}: empty composite index",
                    self.name
                )));
            }
            if let Some(unknown) = composite.iter().find(|f| !seen.contains(f.as_str())) {
                return Err(RowStoreError::InvalidSchema(format!(
                    "{}: index references unknown field {}",
                    self.name, unknown
                )));
            }
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Stored data of one incoming row: the schema's fields with a non-null
    /// value, stringified. Fields the schema does not declare are dropped.
    pub fn project(&self, row: &IndexMap<String, serde_json::Value>) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter_map(|f| {
                row.get(&f.name)
                    .and_then(stringify_value)
                    .map(|v| (f.name.clone(), v))
            })
            .collect()
    }

    /// All index names of this schema, deduplicated, singles first in field
    /// order, then composites in declaration order.
    pub fn index_names(&self) -> Vec<String> {
        let singles = self
            .fields
            .iter()
            .filter(|f| f.primary_key || f.indexed)
            .map(|f| f.name.clone());
        let composites = self.indexes.iter().map(|fields| {
            let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
            index_name_for(&refs)
        });

        let mut seen = HashSet::new();
        singles
            .chain(composites)
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }
}

/// Canonical index name: field names sorted and comma-joined.
pub fn index_name_for(fields: &[&str]) -> String {
    let mut sorted: Vec<&str> = fields.iter().map(|f| f.trim()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.join(",")
}

/// Field names of an index, in index order.
pub fn index_fields(index_name: &str) -> Vec<&str> {
    index_name.split(',').map(str::trim).collect()
}

/// Values of a row under one index, aligned with its fields. A missing
/// field contributes an empty string.
pub fn build_index_value(data: &BTreeMap<String, String>, index_name: &str) -> Vec<String> {
    index_fields(index_name)
        .into_iter()
        .map(|f| data.get(f).cloned().unwrap_or_default())
        .collect()
}

/// True when every component of an index value is empty; such keys are
/// neither stored nor embedded.
pub fn is_empty_index_value(index_value: &[String]) -> bool {
    index_value.iter().all(|v| v.is_empty())
}

/// Text embedded for an index value: components joined by a single space.
/// The result is for similarity search and display only, never parsed back.
pub fn embedding_text(index_value: &[String]) -> String {
    index_value.join(" ")
}
