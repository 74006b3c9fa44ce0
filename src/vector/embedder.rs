use std::sync::OnceLock;

use async_trait::async_trait;
use serde_json::Value;

use super::config::{EmbedderConfig, EmbedderSource};
use super::VectorError;

/// The embedding capability as seen by the compute stage and the resolver.
///
/// Implementations return one vector per input text, positionally aligned.
#[async_trait]
pub trait TextEmbedder: Send + Sync + 'static {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        self.embed_documents(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| VectorError::EmbeddingError("empty response from embedder".into()))
    }
}

/// Map a transport failure onto the error taxonomy: connection problems and
/// timeouts are retryable, everything else is not.
fn classify_send_error(context: &str, e: reqwest::Error) -> VectorError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        VectorError::EmbeddingUnavailable(format!("{context}: {e}"))
    } else {
        VectorError::EmbeddingError(format!("{context}: {e}"))
    }
}

fn classify_status(status: reqwest::StatusCode, message: String) -> VectorError {
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        VectorError::EmbeddingUnavailable(message)
    } else {
        VectorError::EmbeddingError(message)
    }
}

// ── RestEmbedder ──

/// Generic HTTP embedder using request/response JSON templates.
///
/// The request template marks the text slot with `"{{text}}"`; an array holding
/// both `"{{text}}"` and `"{{..}}"` is expanded to every text of a batch. The
/// response template marks where the vector sits with `"{{embedding}}"`.
#[derive(Debug)]
pub struct RestEmbedder {
    client: reqwest::Client,
    url: String,
    request_template: Value,
    response_template: Value,
    dimensions: Option<usize>,
}

impl RestEmbedder {
    pub fn new(config: &EmbedderConfig) -> Result<Self, VectorError> {
        config.validate()?;
        let mut header_map = reqwest::header::HeaderMap::new();
        for (k, v) in config.headers.iter().flatten() {
            let name = reqwest::header::HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| VectorError::EmbeddingError(format!("invalid header name: {e}")))?;
            let val = reqwest::header::HeaderValue::from_str(v)
                .map_err(|e| VectorError::EmbeddingError(format!("invalid header value: {e}")))?;
            header_map.insert(name, val);
        }

        let client = reqwest::Client::builder()
            .default_headers(header_map)
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                VectorError::EmbeddingError(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            url: config.url.clone().unwrap_or_default(),
            request_template: config.request.clone().unwrap_or(Value::Null),
            response_template: config.response.clone().unwrap_or(Value::Null),
            dimensions: config.dimensions,
        })
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    async fn post(&self, body: &Value) -> Result<Value, VectorError> {
        let resp = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_send_error("embedder request failed", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            return Err(classify_status(
                status,
                format!("embedder returned {status}: {body_text}"),
            ));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| VectorError::EmbeddingError(format!("failed to parse response JSON: {e}")))
    }

    fn check_dimensions(&self, vector: Vec<f32>) -> Result<Vec<f32>, VectorError> {
        match self.dimensions {
            Some(expected) if expected != vector.len() => Err(VectorError::DimensionMismatch {
                expected,
                got: vector.len(),
            }),
            _ => Ok(vector),
        }
    }
}

#[async_trait]
impl TextEmbedder for RestEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embedding_path = template::find_marker_path(&self.response_template, "{{embedding}}");

        let vectors = if template::contains(&self.request_template, "{{..}}") {
            let body = template::expand_batch(&self.request_template, texts);
            let response = self.post(&body).await?;
            let vectors = template::extract_batch(&response, &self.response_template, &embedding_path)?;
            if vectors.len() != texts.len() {
                return Err(VectorError::EmbeddingError(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }
            vectors
        } else {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                let body = template::substitute_text(&self.request_template, text);
                let response = self.post(&body).await?;
                out.push(template::to_f32_vec(template::navigate(
                    &response,
                    &embedding_path,
                ))?);
            }
            out
        };

        vectors
            .into_iter()
            .map(|v| self.check_dimensions(v))
            .collect()
    }
}

mod template {
    use serde_json::Value;

    use crate::vector::VectorError;

    pub(super) fn substitute_text(value: &Value, text: &str) -> Value {
        match value {
            Value::String(s) if s == "{{text}}" => Value::String(text.to_owned()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), substitute_text(v, text)))
                    .collect(),
            ),
            Value::Array(arr) => Value::Array(arr.iter().map(|v| substitute_text(v, text)).collect()),
            other => other.clone(),
        }
    }

    pub(super) fn expand_batch(value: &Value, texts: &[&str]) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), expand_batch(v, texts)))
                    .collect(),
            ),
            Value::Array(arr) => {
                let has_text = arr.iter().any(|v| v.as_str() == Some("{{text}}"));
                let has_repeat = arr.iter().any(|v| v.as_str() == Some("{{..}}"));
                if has_text && has_repeat {
                    Value::Array(texts.iter().map(|t| Value::String(t.to_string())).collect())
                } else {
                    Value::Array(arr.iter().map(|v| expand_batch(v, texts)).collect())
                }
            }
            Value::String(s) if s == "{{text}}" && !texts.is_empty() => {
                Value::String(texts[0].to_string())
            }
            other => other.clone(),
        }
    }

    pub(super) fn contains(value: &Value, target: &str) -> bool {
        match value {
            Value::String(s) => s == target,
            Value::Object(map) => map.values().any(|v| contains(v, target)),
            Value::Array(arr) => arr.iter().any(|v| contains(v, target)),
            _ => false,
        }
    }

    /// Path of object keys / array indices leading to `marker`.
    pub(super) fn find_marker_path(template: &Value, marker: &str) -> Vec<String> {
        fn walk(value: &Value, marker: &str, path: &mut Vec<String>) -> bool {
            match value {
                Value::String(s) => s == marker,
                Value::Object(map) => {
                    for (k, v) in map {
                        path.push(k.clone());
                        if walk(v, marker, path) {
                            return true;
                        }
                        path.pop();
                    }
                    false
                }
                Value::Array(arr) => {
                    for (i, v) in arr.iter().enumerate() {
                        path.push(i.to_string());
                        if walk(v, marker, path) {
                            return true;
                        }
                        path.pop();
                    }
                    false
                }
                _ => false,
            }
        }
        let mut path = Vec::new();
        walk(template, marker, &mut path);
        path
    }

    pub(super) fn navigate<'a>(value: &'a Value, path: &[String]) -> &'a Value {
        let mut current = value;
        for key in path {
            current = match current {
                Value::Object(map) => map.get(key.as_str()).unwrap_or(&Value::Null),
                Value::Array(arr) => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| arr.get(idx))
                    .unwrap_or(&Value::Null),
                _ => &Value::Null,
            };
        }
        current
    }

    pub(super) fn extract_batch(
        response: &Value,
        response_template: &Value,
        path: &[String],
    ) -> Result<Vec<Vec<f32>>, VectorError> {
        if !contains(response_template, "{{..}}") {
            return Ok(vec![to_f32_vec(navigate(response, path))?]);
        }
        // The last path segment is the slot inside the repeated array element.
        let parent = &path[..path.len().saturating_sub(1)];
        match navigate(response, parent) {
            Value::Array(items) => {
                let last_key = path.last().map(|s| s.as_str()).unwrap_or("");
                items
                    .iter()
                    .map(|item| {
                        let emb = if last_key.is_empty() || last_key.parse::<usize>().is_ok() {
                            item
                        } else {
                            item.get(last_key).unwrap_or(item)
                        };
                        to_f32_vec(emb)
                    })
                    .collect()
            }
            _ => Ok(vec![to_f32_vec(navigate(response, path))?]),
        }
    }

    pub(super) fn to_f32_vec(value: &Value) -> Result<Vec<f32>, VectorError> {
        match value {
            Value::Array(arr) => arr
                .iter()
                .map(|v| {
                    v.as_f64().map(|f| f as f32).ok_or_else(|| {
                        VectorError::EmbeddingError("embedding array contains non-numeric value".into())
                    })
                })
                .collect(),
            _ => Err(VectorError::EmbeddingError(
                "expected array for embedding vector".into(),
            )),
        }
    }
}

// ── OpenAiEmbedder ──

/// OpenAI-compatible embedder (works with OpenAI, Azure, and proxies).
#[derive(Debug)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    configured_dimensions: Option<usize>,
    detected_dimensions: OnceLock<usize>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbedderConfig) -> Result<Self, VectorError> {
        config.validate()?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| VectorError::EmbeddingError("openAi embedder requires apiKey".into()))?;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "text-embedding-3-small".into());
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".into())
            .trim_end_matches('/')
            .to_owned();

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                VectorError::EmbeddingError(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
            configured_dimensions: config.dimensions,
            detected_dimensions: OnceLock::new(),
        })
    }

    /// Configured dimensions, else the length of the first vector seen.
    pub fn dimensions(&self) -> Option<usize> {
        self.configured_dimensions
            .or_else(|| self.detected_dimensions.get().copied())
    }
}

#[async_trait]
impl TextEmbedder for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let mut body = serde_json::json!({
            "input": texts,
            "model": self.model,
            "encoding_format": "float"
        });
        if let Some(dims) = self.configured_dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error("OpenAI request failed", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            let detail = serde_json::from_str::<Value>(&body_text)
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                        .map(str::to_owned)
                })
                .unwrap_or(body_text);
            return Err(classify_status(
                status,
                format!("OpenAI API error ({status}): {detail}"),
            ));
        }

        let response: Value = resp.json().await.map_err(|e| {
            VectorError::EmbeddingError(format!("failed to parse OpenAI response: {e}"))
        })?;

        let data = response
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| {
                VectorError::EmbeddingError("OpenAI response missing `data` array".into())
            })?;

        let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for item in data {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .map(|i| i as usize)
                .unwrap_or(indexed.len());
            let embedding = item.get("embedding").ok_or_else(|| {
                VectorError::EmbeddingError("OpenAI response item missing `embedding`".into())
            })?;
            let vec = template::to_f32_vec(embedding)?;
            let _ = self.detected_dimensions.set(vec.len());
            indexed.push((index, vec));
        }

        if indexed.len() != texts.len() {
            return Err(VectorError::EmbeddingError(format!(
                "OpenAI returned {} embeddings for {} texts",
                indexed.len(),
                texts.len()
            )));
        }
        indexed.sort_by_key(|(i, _)| *i);
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
}

// ── Embedder Enum ──

/// Dispatch enum over the configured embedder backends.
#[derive(Debug)]
pub enum Embedder {
    Rest(Box<RestEmbedder>),
    OpenAi(Box<OpenAiEmbedder>),
}

impl Embedder {
    pub fn source(&self) -> EmbedderSource {
        match self {
            Embedder::Rest(_) => EmbedderSource::Rest,
            Embedder::OpenAi(_) => EmbedderSource::OpenAi,
        }
    }

    pub fn dimensions(&self) -> Option<usize> {
        match self {
            Embedder::Rest(e) => e.dimensions(),
            Embedder::OpenAi(e) => e.dimensions(),
        }
    }
}

#[async_trait]
impl TextEmbedder for Embedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        match self {
            Embedder::Rest(e) => e.embed_documents(texts).await,
            Embedder::OpenAi(e) => e.embed_documents(texts).await,
        }
    }
}

/// Factory: validate config and create the appropriate embedder variant.
pub fn create_embedder(config: &EmbedderConfig) -> Result<Embedder, VectorError> {
    config.validate()?;
    match config.source {
        EmbedderSource::Rest => Ok(Embedder::Rest(Box::new(RestEmbedder::new(config)?))),
        EmbedderSource::OpenAi => Ok(Embedder::OpenAi(Box::new(OpenAiEmbedder::new(config)?))),
    }
}
