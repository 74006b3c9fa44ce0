use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use rowstore::{ExtractedRecord, RowStoreError};
use serde::Deserialize;

use super::AppState;

const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Default, Deserialize)]
pub struct SubmitParams {
    /// Wait for the stages to process the record before responding.
    #[serde(default)]
    pub wait: bool,
    /// Upper bound on the wait, in milliseconds.
    #[serde(default, rename = "waitTimeoutMs")]
    pub wait_timeout_ms: Option<u64>,
}

/// Either one record or `{"records": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SubmitBody {
    Batch { records: Vec<ExtractedRecord> },
    Single(ExtractedRecord),
}

/// POST /1/records
///
/// Records are published to the stage pipeline and processed asynchronously,
/// so the response is 202 with the stream offsets assigned. With `?wait=true`
/// the handler waits a bounded time and reports which stages finished; it
/// answers 200 only when all of them did.
pub async fn submit_records(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SubmitParams>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), RowStoreError> {
    let records = match body {
        SubmitBody::Batch { records } => records,
        SubmitBody::Single(record) => vec![record],
    };
    if records.is_empty() {
        return Err(RowStoreError::InvalidRecord("no records in request".into()));
    }

    let mut offsets = Vec::with_capacity(records.len());
    for record in records {
        offsets.push(state.manager.submit(record)?);
    }
    tracing::debug!("Accepted {} record(s) at offsets {:?}", offsets.len(), offsets);

    if params.wait {
        let timeout =
            Duration::from_millis(params.wait_timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS));
        let status = state.manager.flush_within(timeout).await;
        let code = if status.is_complete() {
            StatusCode::OK
        } else {
            StatusCode::ACCEPTED
        };
        return Ok((
            code,
            Json(serde_json::json!({ "offsets": offsets, "processed": status })),
        ));
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "offsets": offsets, "processed": null })),
    ))
}
