//! Stage workers wired over record streams.
//!
//! Incoming records fan out to the row writer and, when an embedder is
//! configured, to the embedding compute stage. Compute output is published
//! on a second stream consumed by the embedding store stage. Every stage
//! owns its own cursor and never waits on another.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::embeddings::{EmbeddingComputeStage, EmbeddingStoreStage};
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::rows::RowWriter;
use crate::stream::{RecordStream, Subscription};
use crate::types::{ExtractedRecord, RowEmbeddings};

pub const WRITER_CONSUMER: &str = "row-writer";
pub const COMPUTE_CONSUMER: &str = "embedding-compute";
pub const STORE_CONSUMER: &str = "embedding-store";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Which stages caught up during a bounded flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushStatus {
    pub rows: bool,
    /// `None` when no embedder is configured.
    pub embeddings: Option<bool>,
}

impl FlushStatus {
    pub fn is_complete(&self) -> bool {
        self.rows && self.embeddings.unwrap_or(true)
    }
}

pub struct Pipeline {
    records: Arc<RecordStream<ExtractedRecord>>,
    embeddings: Arc<RecordStream<RowEmbeddings>>,
    embedding_enabled: bool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Subscribe every stage and spawn its worker. Must run inside a tokio
    /// runtime.
    pub fn start(
        writer: Arc<RowWriter>,
        compute: Option<Arc<EmbeddingComputeStage>>,
        store: Arc<EmbeddingStoreStage>,
        retry: RetryPolicy,
    ) -> Self {
        let records = RecordStream::new("records");
        let embeddings = RecordStream::new("row-embeddings");
        let mut workers = Vec::new();

        let sub = records.subscribe(WRITER_CONSUMER);
        workers.push(tokio::spawn(run_stage(sub, retry, move |record: ExtractedRecord| {
            let writer = Arc::clone(&writer);
            async move { writer.write(&record).await.map(|_| ()) }
        })));

        let embedding_enabled = compute.is_some();
        if let Some(compute) = compute {
            let sub = records.subscribe(COMPUTE_CONSUMER);
            let output = Arc::clone(&embeddings);
            workers.push(tokio::spawn(run_stage(sub, retry, move |record: ExtractedRecord| {
                let compute = Arc::clone(&compute);
                let output = Arc::clone(&output);
                async move {
                    for message in compute.compute(&record).await? {
                        output.publish(message)?;
                    }
                    Ok(())
                }
            })));

            let sub = embeddings.subscribe(STORE_CONSUMER);
            workers.push(tokio::spawn(run_stage(sub, retry, move |message: RowEmbeddings| {
                let store = Arc::clone(&store);
                async move { store.store(&message).await.map(|_| ()) }
            })));
        } else {
            tracing::info!("No embedder configured, embedding stages disabled");
        }

        tracing::info!("Pipeline started with {} stage workers", workers.len());
        Self {
            records,
            embeddings,
            embedding_enabled,
            workers: Mutex::new(workers),
        }
    }

    /// Publish a record to every stage. Returns its stream offset.
    pub fn submit(&self, record: ExtractedRecord) -> Result<u64> {
        self.records.publish(record)
    }

    pub fn embedding_enabled(&self) -> bool {
        self.embedding_enabled
    }

    pub fn records(&self) -> &Arc<RecordStream<ExtractedRecord>> {
        &self.records
    }

    /// Wait until every stage has finished with every record submitted so far.
    ///
    /// Unbounded: a stage that keeps redelivering never lets this return.
    /// Callers serving requests use [`Pipeline::flush_within`].
    pub async fn flush(&self) {
        let end = self.records.end_offset();
        tokio::join!(self.wait_rows(end), self.wait_embeddings(end));
    }

    /// Wait at most `timeout` for the stages, each tracked on its own so an
    /// embedding outage does not hide a finished row write.
    pub async fn flush_within(&self, timeout: Duration) -> FlushStatus {
        let deadline = tokio::time::Instant::now() + timeout;
        let end = self.records.end_offset();
        let (rows, embeddings) = tokio::join!(
            tokio::time::timeout_at(deadline, self.wait_rows(end)),
            tokio::time::timeout_at(deadline, self.wait_embeddings(end)),
        );
        let status = FlushStatus {
            rows: rows.is_ok(),
            embeddings: self.embedding_enabled.then_some(embeddings.is_ok()),
        };
        if !status.is_complete() {
            tracing::warn!("Flush incomplete after {:?}: {:?}", timeout, status);
        }
        status
    }

    async fn wait_rows(&self, end: u64) {
        self.records.wait_for(WRITER_CONSUMER, end).await;
    }

    async fn wait_embeddings(&self, end: u64) {
        if !self.embedding_enabled {
            return;
        }
        self.records.wait_for(COMPUTE_CONSUMER, end).await;
        let end = self.embeddings.end_offset();
        self.embeddings.wait_for(STORE_CONSUMER, end).await;
    }

    /// Stop accepting records, let workers drain, and abort any that are
    /// still retrying after a grace period.
    pub async fn shutdown(&self) {
        self.records.close();
        let workers: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        let mut workers = workers.into_iter();
        // Embeddings stream closes once its producer is done.
        if let Some(mut writer) = workers.next() {
            join_or_abort(&mut writer).await;
        }
        if let Some(mut compute) = workers.next() {
            join_or_abort(&mut compute).await;
        }
        self.embeddings.close();
        for mut worker in workers {
            join_or_abort(&mut worker).await;
        }
        tracing::info!("Pipeline stopped");
    }
}

async fn join_or_abort(handle: &mut JoinHandle<()>) {
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut *handle).await.is_err() {
        tracing::warn!("Stage worker did not stop within {:?}, aborting", SHUTDOWN_GRACE);
        handle.abort();
    }
}

/// Consume a subscription until its stream closes.
///
/// Success acknowledges the record. A non-transient error is logged and the
/// record acknowledged, so a bad record never blocks the stage. A transient
/// error (after the handler's own retries) rewinds the cursor and the record
/// is redelivered after a backoff.
async fn run_stage<T, F, Fut>(mut sub: Subscription<T>, retry: RetryPolicy, handle: F)
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    let stage = sub.consumer().to_string();
    tracing::info!("[{}] stage worker started", stage);
    let mut failures = 0u32;
    while let Some((offset, item)) = sub.recv().await {
        match handle(item).await {
            Ok(()) => {
                failures = 0;
                sub.ack(offset);
            }
            Err(e) if e.is_transient() => {
                failures = failures.saturating_add(1);
                let delay = retry.backoff(failures);
                tracing::error!(
                    "[{}] record {} failed transiently ({} in a row), redelivering in {:?}: {}",
                    stage,
                    offset,
                    failures,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                sub.rewind();
            }
            Err(e) => {
                failures = 0;
                tracing::warn!("[{}] skipping record {}: {}", stage, offset, e);
                sub.ack(offset);
            }
        }
    }
    tracing::info!("[{}] stage worker stopped", stage);
}
