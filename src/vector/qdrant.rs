use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use super::store::{NewPoint, VectorStore};
use super::{PointPayload, ScoredPoint, VectorError};
use crate::circuit_breaker::CircuitBreaker;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Vector store backed by a Qdrant server over its REST API.
///
/// Collections use cosine distance. Requests are guarded by a circuit breaker;
/// while it is open every call fails fast with `VectorError::Unavailable`.
pub struct QdrantStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    breaker: CircuitBreaker,
}

#[derive(Deserialize)]
struct CollectionsResponse {
    result: CollectionsResult,
}

#[derive(Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<PointPayload>,
}

impl QdrantStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, VectorError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VectorError::Rejected(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            client,
            breaker: CircuitBreaker::new("qdrant", DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN),
        })
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, returning the response for any status the caller may
    /// want to interpret. Transport failures and 5xx trip the breaker.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, VectorError> {
        if !self.breaker.allow_request() {
            return Err(VectorError::Unavailable("circuit open".into()));
        }
        let req = match &self.api_key {
            Some(key) => req.header("api-key", key),
            None => req,
        };
        match req.send().await {
            Ok(resp) if resp.status().is_server_error() => {
                self.breaker.record_failure();
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                Err(VectorError::Unavailable(format!("qdrant returned {status}: {body}")))
            }
            Ok(resp) => {
                self.breaker.record_success();
                Ok(resp)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(VectorError::Unavailable(format!("qdrant request failed: {e}")))
            }
        }
    }

    async fn expect_success(resp: reqwest::Response) -> Result<reqwest::Response, VectorError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(VectorError::Rejected(format!("qdrant returned {status}: {body}")))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn list_collections(&self) -> Result<Vec<String>, VectorError> {
        let resp = self.send(self.client.get(self.url("/collections"))).await?;
        let parsed: CollectionsResponse = Self::expect_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| VectorError::SerializationError(e.to_string()))?;
        Ok(parsed.result.collections.into_iter().map(|c| c.name).collect())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, VectorError> {
        let resp = self
            .send(self.client.get(self.url(&format!("/collections/{name}"))))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::expect_success(resp).await?;
        Ok(true)
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), VectorError> {
        let body = json!({"vectors": {"size": dimensions, "distance": "Cosine"}});
        let resp = self
            .send(
                self.client
                    .put(self.url(&format!("/collections/{name}")))
                    .json(&body),
            )
            .await?;
        let status = resp.status();
        if status.is_success() {
            tracing::info!("Created Qdrant collection {} with dimension {}", name, dimensions);
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        // A concurrent creator got there first.
        if status == StatusCode::CONFLICT || text.contains("already exists") {
            tracing::debug!("Qdrant collection {} already exists", name);
            return Ok(());
        }
        Err(VectorError::Rejected(format!(
            "qdrant returned {status} creating {name}: {text}"
        )))
    }

    async fn upsert(&self, name: &str, points: Vec<NewPoint>) -> Result<(), VectorError> {
        if points.is_empty() {
            return Ok(());
        }
        let points: Vec<Value> = points
            .into_iter()
            .map(|p| json!({"id": p.id, "vector": p.vector, "payload": p.payload}))
            .collect();
        let resp = self
            .send(
                self.client
                    .put(self.url(&format!("/collections/{name}/points?wait=true")))
                    .json(&json!({ "points": points })),
            )
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(VectorError::CollectionNotFound(name.to_string()));
        }
        Self::expect_success(resp).await?;
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        index_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorError> {
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(filter) = index_name {
            body["filter"] = json!({
                "must": [{"key": "index_name", "match": {"value": filter}}]
            });
        }
        let resp = self
            .send(
                self.client
                    .post(self.url(&format!("/collections/{name}/points/search")))
                    .json(&body),
            )
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(VectorError::CollectionNotFound(name.to_string()));
        }
        let parsed: SearchResponse = Self::expect_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| VectorError::SerializationError(e.to_string()))?;
        Ok(parsed
            .result
            .into_iter()
            .map(|hit| ScoredPoint {
                id: match hit.id {
                    Value::String(s) => s,
                    other => other.to_string(),
                },
                score: hit.score,
                payload: hit.payload.unwrap_or(PointPayload {
                    index_name: String::new(),
                    index_value: Vec::new(),
                    text: String::new(),
                }),
            })
            .collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), VectorError> {
        let resp = self
            .send(self.client.delete(self.url(&format!("/collections/{name}"))))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(resp).await?;
        tracing::info!("Deleted Qdrant collection: {}", name);
        Ok(())
    }
}
