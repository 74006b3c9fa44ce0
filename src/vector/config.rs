use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::VectorError;

/// Source type for an embedder configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmbedderSource {
    #[default]
    OpenAi,
    Rest,
}

/// Configuration for creating an embedder.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EmbedderConfig {
    pub source: EmbedderSource,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub dimensions: Option<usize>,
    pub url: Option<String>,
    pub request: Option<serde_json::Value>,
    pub response: Option<serde_json::Value>,
    pub headers: Option<HashMap<String, String>>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

pub const DEFAULT_EMBEDDER_TIMEOUT_MS: u64 = 30_000;

impl EmbedderConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_EMBEDDER_TIMEOUT_MS))
    }

    /// Validate that required fields are present for the given source type.
    pub fn validate(&self) -> Result<(), VectorError> {
        match self.source {
            EmbedderSource::OpenAi => {
                if self.api_key.is_none() {
                    return Err(VectorError::EmbeddingError(
                        "openAi embedder requires `apiKey`".into(),
                    ));
                }
            }
            EmbedderSource::Rest => {
                let mut missing = Vec::new();
                if self.url.is_none() {
                    missing.push("`url`");
                }
                if self.request.is_none() {
                    missing.push("`request`");
                }
                if self.response.is_none() {
                    missing.push("`response`");
                }
                if !missing.is_empty() {
                    return Err(VectorError::EmbeddingError(format!(
                        "rest embedder requires {}",
                        missing.join(", ")
                    )));
                }
            }
        }
        if self.dimensions == Some(0) {
            return Err(VectorError::EmbeddingError(
                "`dimensions` must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
