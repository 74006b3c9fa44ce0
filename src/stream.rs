//! Ordered, at-least-once, multi-consumer record stream.
//!
//! Every consumer owns a named cursor: the offset of the first record it has
//! not acknowledged. A subscription reads ahead of its cursor; after a crash
//! or an explicit rewind it resumes from the cursor, so unacknowledged records
//! are redelivered. Records every registered consumer has acknowledged are
//! dropped from memory.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tokio::sync::Notify;

use crate::error::{Result, RowStoreError};

struct Log<T> {
    /// Offset of `entries[0]`.
    base: u64,
    entries: VecDeque<T>,
}

pub struct RecordStream<T> {
    name: String,
    log: Mutex<Log<T>>,
    cursors: DashMap<String, u64>,
    published: Notify,
    acked: Notify,
    closed: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> RecordStream<T> {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            log: Mutex::new(Log {
                base: 0,
                entries: VecDeque::new(),
            }),
            cursors: DashMap::new(),
            published: Notify::new(),
            acked: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a record, returning its offset.
    pub fn publish(&self, item: T) -> Result<u64> {
        if self.is_closed() {
            return Err(RowStoreError::StreamClosed(self.name.clone()));
        }
        let offset = {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            log.entries.push_back(item);
            log.base + log.entries.len() as u64 - 1
        };
        self.published.notify_waiters();
        Ok(offset)
    }

    /// Offset the next published record will get.
    pub fn end_offset(&self) -> u64 {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.base + log.entries.len() as u64
    }

    /// Attach to the named cursor, creating it at the oldest retained record
    /// when the consumer is new.
    pub fn subscribe(self: &Arc<Self>, consumer: &str) -> Subscription<T> {
        let base = self.log.lock().unwrap_or_else(PoisonError::into_inner).base;
        let position = *self
            .cursors
            .entry(consumer.to_string())
            .or_insert(base)
            .value();
        tracing::debug!(
            "[stream {}] consumer {} subscribed at offset {}",
            self.name,
            consumer,
            position
        );
        Subscription {
            stream: Arc::clone(self),
            consumer: consumer.to_string(),
            position,
        }
    }

    pub fn committed(&self, consumer: &str) -> Option<u64> {
        self.cursors.get(consumer).map(|c| *c)
    }

    /// Stop accepting records. Subscribers drain what is left, then see `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.published.notify_waiters();
        self.acked.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait until `consumer` has acknowledged everything before `offset`.
    pub async fn wait_for(&self, consumer: &str, offset: u64) {
        loop {
            let notified = self.acked.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.committed(consumer).unwrap_or(0) >= offset || self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    fn read(&self, offset: u64) -> Option<T> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let idx = offset.checked_sub(log.base)?;
        log.entries.get(idx as usize).cloned()
    }

    fn commit(&self, consumer: &str, next: u64) {
        if let Some(mut cursor) = self.cursors.get_mut(consumer) {
            if next > *cursor {
                *cursor = next;
            }
        }
        self.compact();
        self.acked.notify_waiters();
    }

    fn compact(&self) {
        let Some(min) = self.cursors.iter().map(|c| *c.value()).min() else {
            return;
        };
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        while log.base < min && !log.entries.is_empty() {
            log.entries.pop_front();
            log.base += 1;
        }
    }
}

/// One consumer's view of a stream.
pub struct Subscription<T> {
    stream: Arc<RecordStream<T>>,
    consumer: String,
    position: u64,
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Next record and its offset. Returns `None` once the stream is closed
    /// and every record has been delivered.
    pub async fn recv(&mut self) -> Option<(u64, T)> {
        loop {
            let notified = self.stream.published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.stream.read(self.position) {
                let offset = self.position;
                self.position += 1;
                return Some((offset, item));
            }
            if self.stream.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Acknowledge every record up to and including `offset`.
    pub fn ack(&self, offset: u64) {
        self.stream.commit(&self.consumer, offset + 1);
    }

    /// Move the read position back to the committed cursor so unacknowledged
    /// records are delivered again.
    pub fn rewind(&mut self) {
        let committed = self.stream.committed(&self.consumer).unwrap_or(0);
        tracing::debug!(
            "[stream {}] consumer {} rewinding {} -> {}",
            self.stream.name,
            self.consumer,
            self.position,
            committed
        );
        self.position = committed;
    }
}
