//! Message protocol between bucket handles and the bucket actor

use super::Page;
use crate::event::StoreEvent;
use basalt_core::{Fields, Key, Record, StoreResult};
use basalt_durability::SnapshotState;
use tokio::sync::oneshot;

/// Aggregations the actor computes over a matched record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AggregateOp {
    Sum,
    Avg,
    Min,
    Max,
}

/// One operation of a transaction's per-bucket commit batch.
#[derive(Debug, Clone)]
pub(crate) enum CommitOp {
    Insert {
        key: Key,
        record: Record,
    },
    Update {
        key: Key,
        record: Record,
        expected_version: u64,
    },
    Delete {
        key: Key,
        expected_version: u64,
    },
}

/// Inverse of an applied commit operation, applied verbatim on rollback.
#[derive(Debug, Clone)]
pub(crate) enum UndoOp {
    RemoveInserted { key: Key },
    RestoreUpdated { key: Key, record: Record },
    RestoreDeleted { key: Key, record: Record },
}

/// What `commit_batch` hands back: the events the transaction engine will
/// publish after every bucket commits, and the undo log it will replay if a
/// later bucket fails.
#[derive(Debug)]
pub(crate) struct CommitOutcome {
    pub events: Vec<StoreEvent>,
    pub undo: Vec<UndoOp>,
}

/// The bucket actor's full message set. Every message carries a oneshot
/// reply; the actor answers each message before taking the next.
pub(crate) enum BucketMessage {
    Insert {
        data: Fields,
        reply: oneshot::Sender<StoreResult<Record>>,
    },
    Get {
        key: Key,
        reply: oneshot::Sender<Option<Record>>,
    },
    Update {
        key: Key,
        changes: Fields,
        reply: oneshot::Sender<StoreResult<Record>>,
    },
    Delete {
        key: Key,
        reply: oneshot::Sender<Option<Record>>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    All {
        reply: oneshot::Sender<Vec<Record>>,
    },
    Where {
        filter: Fields,
        reply: oneshot::Sender<Vec<Record>>,
    },
    FindOne {
        filter: Fields,
        reply: oneshot::Sender<Option<Record>>,
    },
    Count {
        filter: Option<Fields>,
        reply: oneshot::Sender<usize>,
    },
    First {
        n: usize,
        reply: oneshot::Sender<Vec<Record>>,
    },
    Last {
        n: usize,
        reply: oneshot::Sender<Vec<Record>>,
    },
    Paginate {
        after: Option<Key>,
        limit: usize,
        reply: oneshot::Sender<Page>,
    },
    Aggregate {
        op: AggregateOp,
        field: String,
        filter: Option<Fields>,
        reply: oneshot::Sender<Option<f64>>,
    },
    PurgeExpired {
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<SnapshotState>,
    },
    Counter {
        reply: oneshot::Sender<i64>,
    },
    CommitBatch {
        ops: Vec<CommitOp>,
        counter_update: Option<i64>,
        reply: oneshot::Sender<StoreResult<CommitOutcome>>,
    },
    RollbackBatch {
        undo: Vec<UndoOp>,
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}
