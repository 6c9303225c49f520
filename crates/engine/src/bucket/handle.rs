//! Stateless async handle over a bucket actor
//!
//! Cheap to clone; every method sends one message and awaits its reply. A
//! handle whose actor has stopped (bucket dropped or store shut down)
//! reports `BucketNotDefined` on every call.

use super::message::{AggregateOp, BucketMessage, CommitOp, CommitOutcome, UndoOp};
use super::{object_fields, Page};
use basalt_core::{Key, Record, StoreError, StoreResult};
use basalt_durability::SnapshotState;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Async handle to one bucket.
#[derive(Clone, Debug)]
pub struct BucketHandle {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<BucketMessage>,
}

impl BucketHandle {
    pub(crate) fn new(name: &str, sender: mpsc::UnboundedSender<BucketMessage>) -> Self {
        Self {
            name: Arc::from(name),
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> BucketMessage,
    ) -> StoreResult<T> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(build(reply))
            .map_err(|_| StoreError::bucket_not_defined(self.name.as_ref()))?;
        receiver
            .await
            .map_err(|_| StoreError::bucket_not_defined(self.name.as_ref()))
    }

    /// Insert a record. `data` must be a JSON object.
    pub async fn insert(&self, data: serde_json::Value) -> StoreResult<Record> {
        let data = object_fields(self.name(), data)?;
        self.request(|reply| BucketMessage::Insert { data, reply })
            .await?
    }

    /// Fetch a record by primary key.
    pub async fn get(&self, key: impl Into<Key>) -> StoreResult<Option<Record>> {
        let key = key.into();
        self.request(|reply| BucketMessage::Get { key, reply }).await
    }

    /// Apply `changes` (a JSON object) to an existing record.
    pub async fn update(
        &self,
        key: impl Into<Key>,
        changes: serde_json::Value,
    ) -> StoreResult<Record> {
        let key = key.into();
        let changes = object_fields(self.name(), changes)?;
        self.request(|reply| BucketMessage::Update { key, changes, reply })
            .await?
    }

    /// Delete by key; returns the removed record, or `None` when the key
    /// was absent (a silent no-op).
    pub async fn delete(&self, key: impl Into<Key>) -> StoreResult<Option<Record>> {
        let key = key.into();
        self.request(|reply| BucketMessage::Delete { key, reply })
            .await
    }

    /// Drop every record and index entry. Publishes nothing.
    pub async fn clear(&self) -> StoreResult<()> {
        self.request(|reply| BucketMessage::Clear { reply }).await
    }

    pub async fn all(&self) -> StoreResult<Vec<Record>> {
        self.request(|reply| BucketMessage::All { reply }).await
    }

    /// Records matching a strict-equality filter object.
    pub async fn find(&self, filter: serde_json::Value) -> StoreResult<Vec<Record>> {
        let filter = object_fields(self.name(), filter)?;
        self.request(|reply| BucketMessage::Where { filter, reply })
            .await
    }

    pub async fn find_one(&self, filter: serde_json::Value) -> StoreResult<Option<Record>> {
        let filter = object_fields(self.name(), filter)?;
        self.request(|reply| BucketMessage::FindOne { filter, reply })
            .await
    }

    /// Count all records, or those matching `filter`.
    pub async fn count(&self, filter: Option<serde_json::Value>) -> StoreResult<usize> {
        let filter = match filter {
            Some(value) => Some(object_fields(self.name(), value)?),
            None => None,
        };
        self.request(|reply| BucketMessage::Count { filter, reply })
            .await
    }

    /// First `n` records in the bucket's storage order.
    pub async fn first(&self, n: usize) -> StoreResult<Vec<Record>> {
        self.request(|reply| BucketMessage::First { n, reply }).await
    }

    /// Last `n` records, still in ascending storage order.
    pub async fn last(&self, n: usize) -> StoreResult<Vec<Record>> {
        self.request(|reply| BucketMessage::Last { n, reply }).await
    }

    /// Cursor pagination: records after `after`, at most `limit`.
    pub async fn paginate(&self, after: Option<Key>, limit: usize) -> StoreResult<Page> {
        self.request(|reply| BucketMessage::Paginate { after, limit, reply })
            .await
    }

    /// Sum of a numeric field over the matched set; 0 when nothing matches.
    pub async fn sum(&self, field: &str, filter: Option<serde_json::Value>) -> StoreResult<f64> {
        Ok(self
            .aggregate(AggregateOp::Sum, field, filter)
            .await?
            .unwrap_or(0.0))
    }

    /// Mean of a numeric field over the matched set; 0 when nothing matches.
    pub async fn avg(&self, field: &str, filter: Option<serde_json::Value>) -> StoreResult<f64> {
        Ok(self
            .aggregate(AggregateOp::Avg, field, filter)
            .await?
            .unwrap_or(0.0))
    }

    /// Minimum of a numeric field, or `None` when nothing matches.
    pub async fn min(
        &self,
        field: &str,
        filter: Option<serde_json::Value>,
    ) -> StoreResult<Option<f64>> {
        self.aggregate(AggregateOp::Min, field, filter).await
    }

    /// Maximum of a numeric field, or `None` when nothing matches.
    pub async fn max(
        &self,
        field: &str,
        filter: Option<serde_json::Value>,
    ) -> StoreResult<Option<f64>> {
        self.aggregate(AggregateOp::Max, field, filter).await
    }

    async fn aggregate(
        &self,
        op: AggregateOp,
        field: &str,
        filter: Option<serde_json::Value>,
    ) -> StoreResult<Option<f64>> {
        let filter = match filter {
            Some(value) => Some(object_fields(self.name(), value)?),
            None => None,
        };
        let field = field.to_string();
        self.request(|reply| BucketMessage::Aggregate {
            op,
            field,
            filter,
            reply,
        })
        .await
    }

    /// Remove every record past its TTL deadline; returns how many.
    pub async fn purge_expired(&self) -> StoreResult<usize> {
        self.request(|reply| BucketMessage::PurgeExpired { reply })
            .await
    }

    /// Atomically capture the bucket's contents and counter.
    pub async fn snapshot(&self) -> StoreResult<SnapshotState> {
        self.request(|reply| BucketMessage::Snapshot { reply }).await
    }

    /// Current autoincrement counter.
    pub async fn autoincrement_counter(&self) -> StoreResult<i64> {
        self.request(|reply| BucketMessage::Counter { reply }).await
    }

    pub(crate) async fn commit_batch(
        &self,
        ops: Vec<CommitOp>,
        counter_update: Option<i64>,
    ) -> StoreResult<CommitOutcome> {
        self.request(|reply| BucketMessage::CommitBatch {
            ops,
            counter_update,
            reply,
        })
        .await?
    }

    pub(crate) async fn rollback_batch(&self, undo: Vec<UndoOp>) -> StoreResult<()> {
        self.request(|reply| BucketMessage::RollbackBatch { undo, reply })
            .await
    }

    /// Gracefully terminate the actor. Later calls on any clone of this
    /// handle report `BucketNotDefined`.
    pub(crate) async fn stop(&self) -> StoreResult<()> {
        self.request(|reply| BucketMessage::Stop { reply }).await
    }
}

