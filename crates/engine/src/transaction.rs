//! Cross-bucket transactions with optimistic commit
//!
//! A transaction buffers every mutation locally: inserts, updates (with the
//! `_version` observed when first touched), and deletes. Reads overlay the
//! buffer on committed state, so a transaction sees its own writes. Commit
//! folds each bucket's buffer into a batch, walks touched buckets in
//! registration order, and drives each bucket's two-phase `commit_batch`;
//! if one bucket fails, previously committed buckets are rolled back in
//! reverse order (best-effort) and the failure propagates. Events publish
//! only after every bucket commits, so subscribers never observe a partial
//! transaction.

use crate::bucket::{matches_filter, object_fields, BucketHandle, CommitOp, UndoOp};
use crate::bus::EventBus;
use crate::event::StoreEvent;
use crate::registry::{BucketEntry, SharedRegistry};
use basalt_core::schema::{BucketDefinition, GeneratedStrategy};
use basalt_core::{
    IssueCode, Key, Record, SchemaValidator, StoreError, StoreResult, ValidationIssue,
    FIELD_EXPIRES_AT,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

struct PendingUpdate {
    record: Record,
    /// `_version` observed when this key was first touched; kept across
    /// repeated updates
    expected_version: u64,
}

struct TxBuffer {
    entry: BucketEntry,
    /// Locally tracked autoincrement counter, fetched on first insert
    counter: Option<i64>,
    inserts: HashMap<Key, Record>,
    updates: HashMap<Key, PendingUpdate>,
    deletes: HashMap<Key, u64>,
    /// Keys in first-touch order (may contain repeats; folding dedupes)
    journal: Vec<Key>,
}

impl TxBuffer {
    fn new(entry: BucketEntry) -> Self {
        Self {
            entry,
            counter: None,
            inserts: HashMap::new(),
            updates: HashMap::new(),
            deletes: HashMap::new(),
            journal: Vec::new(),
        }
    }

    /// Fold the journal into the minimal batch: one op per key in
    /// first-touch order, except delete-then-reinsert which needs both.
    fn fold(&self) -> Vec<CommitOp> {
        let mut seen = HashSet::new();
        let mut ops = Vec::new();
        for key in &self.journal {
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Some(expected_version) = self.deletes.get(key) {
                ops.push(CommitOp::Delete {
                    key: key.clone(),
                    expected_version: *expected_version,
                });
            }
            if let Some(record) = self.inserts.get(key) {
                ops.push(CommitOp::Insert {
                    key: key.clone(),
                    record: record.clone(),
                });
            } else if let Some(pending) = self.updates.get(key) {
                ops.push(CommitOp::Update {
                    key: key.clone(),
                    record: pending.record.clone(),
                    expected_version: pending.expected_version,
                });
            }
        }
        ops
    }
}

#[derive(Default)]
struct TxState {
    buffers: HashMap<String, TxBuffer>,
}

struct TxInner {
    registry: SharedRegistry,
    bus: EventBus,
    state: Mutex<TxState>,
    committed: AtomicBool,
}

/// One user transaction. Clones share the same buffer.
#[derive(Clone)]
pub struct TransactionContext {
    inner: Arc<TxInner>,
}

impl TransactionContext {
    pub(crate) fn new(registry: SharedRegistry, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(TxInner {
                registry,
                bus,
                state: Mutex::new(TxState::default()),
                committed: AtomicBool::new(false),
            }),
        }
    }

    /// Transactional handle for one bucket. Buffer state is per bucket and
    /// shared by every handle for the same name.
    pub fn bucket(&self, name: &str) -> StoreResult<TransactionBucket> {
        self.inner.ensure_buffer(name)?;
        Ok(TransactionBucket {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
        })
    }

    pub fn is_committed(&self) -> bool {
        self.inner.committed.load(Ordering::SeqCst)
    }

    /// Commit every buffered mutation. One-shot: a second call fails with
    /// [`StoreError::TransactionAlreadyCommitted`].
    pub async fn commit(&self) -> StoreResult<()> {
        if self.inner.committed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::TransactionAlreadyCommitted);
        }

        let mut buffers: Vec<TxBuffer> = {
            let mut state = self.inner.state.lock();
            state.buffers.drain().map(|(_, b)| b).collect()
        };
        buffers.sort_by_key(|b| b.entry.order);

        let mut batches = Vec::new();
        for buffer in buffers {
            let ops = buffer.fold();
            if ops.is_empty() && buffer.counter.is_none() {
                continue;
            }
            batches.push((buffer.entry.handle.clone(), ops, buffer.counter));
        }
        if batches.is_empty() {
            return Ok(());
        }

        let mut committed: Vec<(BucketHandle, Vec<UndoOp>)> = Vec::new();
        let mut events: Vec<StoreEvent> = Vec::new();
        for (handle, ops, counter) in batches {
            match handle.commit_batch(ops, counter).await {
                Ok(outcome) => {
                    events.extend(outcome.events);
                    committed.push((handle, outcome.undo));
                }
                Err(e) => {
                    for (h, undo) in committed.into_iter().rev() {
                        if let Err(rollback_err) = h.rollback_batch(undo).await {
                            warn!(
                                bucket = h.name(),
                                "rollback failed after commit conflict: {}", rollback_err
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        for event in events {
            self.inner.bus.publish(Arc::new(event));
        }
        Ok(())
    }
}

impl TxInner {
    fn ensure_buffer(&self, name: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.buffers.contains_key(name) {
            return Ok(());
        }
        let entry = self
            .registry
            .read()
            .get(name)
            .ok_or_else(|| StoreError::bucket_not_defined(name))?;
        state.buffers.insert(name.to_string(), TxBuffer::new(entry));
        Ok(())
    }

    fn guard_open(&self) -> StoreResult<()> {
        if self.committed.load(Ordering::SeqCst) {
            Err(StoreError::TransactionAlreadyCommitted)
        } else {
            Ok(())
        }
    }

    fn pieces(
        &self,
        name: &str,
    ) -> (
        BucketHandle,
        Arc<SchemaValidator>,
        Arc<BucketDefinition>,
        Option<i64>,
    ) {
        let state = self.state.lock();
        let buffer = state.buffers.get(name).expect("buffer created with handle");
        (
            buffer.entry.handle.clone(),
            Arc::clone(&buffer.entry.validator),
            Arc::clone(&buffer.entry.definition),
            buffer.counter,
        )
    }
}

enum Overlay {
    Deleted,
    Buffered(Record),
    Untouched,
}

/// Transactional handle to one bucket: mutations buffer, reads overlay.
pub struct TransactionBucket {
    inner: Arc<TxInner>,
    name: String,
}

impl std::fmt::Debug for TransactionBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBucket")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl TransactionBucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer an insert. The record is fully prepared (generated fields,
    /// defaults, metadata, TTL deadline) and validated now; unique checks
    /// wait for commit.
    pub async fn insert(&self, data: Value) -> StoreResult<Record> {
        self.inner.guard_open()?;
        let data = object_fields(&self.name, data)?;
        let (handle, validator, definition, counter) = self.inner.pieces(&self.name);

        let counter = match counter {
            Some(c) => c,
            None => {
                let fetched = handle.autoincrement_counter().await?;
                let mut state = self.inner.state.lock();
                let buffer = state.buffers.get_mut(&self.name).expect("buffer exists");
                *buffer.counter.get_or_insert(fetched)
            }
        };

        let mut local = counter;
        let record = {
            let mut next = || {
                local += 1;
                local
            };
            validator.prepare_insert(data, &mut next)?
        };
        let record = attach_ttl(&definition, record);
        local = explicit_autoincrement_floor(&definition, &record, local);

        let key = extract_key(&self.name, &validator, &record)?;
        let mut state = self.inner.state.lock();
        let buffer = state.buffers.get_mut(&self.name).expect("buffer exists");
        buffer.counter = Some(local);
        buffer.journal.push(key.clone());
        buffer.inserts.insert(key, record.clone());
        Ok(record)
    }

    /// Buffer an update over the overlaid current record.
    pub async fn update(&self, key: impl Into<Key>, changes: Value) -> StoreResult<Record> {
        self.inner.guard_open()?;
        let key = key.into();
        let changes = object_fields(&self.name, changes)?;
        let (handle, validator, _, _) = self.inner.pieces(&self.name);

        enum Base {
            Insert(Record),
            Update(Record, u64),
            Fresh,
        }
        let base = {
            let state = self.inner.state.lock();
            let buffer = state.buffers.get(&self.name).expect("buffer exists");
            if buffer.deletes.contains_key(&key) {
                return Err(StoreError::record_not_found(&self.name, key));
            } else if let Some(record) = buffer.inserts.get(&key) {
                Base::Insert(record.clone())
            } else if let Some(pending) = buffer.updates.get(&key) {
                Base::Update(pending.record.clone(), pending.expected_version)
            } else {
                Base::Fresh
            }
        };

        match base {
            Base::Insert(record) => {
                let new = validator.prepare_update(&record, changes)?;
                let mut state = self.inner.state.lock();
                let buffer = state.buffers.get_mut(&self.name).expect("buffer exists");
                buffer.inserts.insert(key, new.clone());
                Ok(new)
            }
            Base::Update(record, expected_version) => {
                let new = validator.prepare_update(&record, changes)?;
                let mut state = self.inner.state.lock();
                let buffer = state.buffers.get_mut(&self.name).expect("buffer exists");
                buffer.updates.insert(
                    key,
                    PendingUpdate {
                        record: new.clone(),
                        expected_version,
                    },
                );
                Ok(new)
            }
            Base::Fresh => {
                let current = handle
                    .get(key.clone())
                    .await?
                    .ok_or_else(|| StoreError::record_not_found(&self.name, key.clone()))?;
                let new = validator.prepare_update(&current, changes)?;
                let mut state = self.inner.state.lock();
                let buffer = state.buffers.get_mut(&self.name).expect("buffer exists");
                buffer.journal.push(key.clone());
                buffer.updates.insert(
                    key,
                    PendingUpdate {
                        record: new.clone(),
                        expected_version: current.version(),
                    },
                );
                Ok(new)
            }
        }
    }

    /// Buffer a delete. Deleting a buffered insert cancels it outright;
    /// deleting an absent key is a silent no-op.
    pub async fn delete(&self, key: impl Into<Key>) -> StoreResult<Option<Record>> {
        self.inner.guard_open()?;
        let key = key.into();
        let (handle, _, _, _) = self.inner.pieces(&self.name);

        {
            let mut state = self.inner.state.lock();
            let buffer = state.buffers.get_mut(&self.name).expect("buffer exists");
            if buffer.deletes.contains_key(&key) {
                return Ok(None);
            }
            if let Some(record) = buffer.inserts.remove(&key) {
                return Ok(Some(record));
            }
            if let Some(pending) = buffer.updates.remove(&key) {
                buffer.journal.push(key.clone());
                buffer.deletes.insert(key, pending.expected_version);
                return Ok(Some(pending.record));
            }
        }

        let current = match handle.get(key.clone()).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        let mut state = self.inner.state.lock();
        let buffer = state.buffers.get_mut(&self.name).expect("buffer exists");
        buffer.journal.push(key.clone());
        buffer.deletes.insert(key, current.version());
        Ok(Some(current))
    }

    /// Read through the overlay: buffered writes win, tombstones hide.
    pub async fn get(&self, key: impl Into<Key>) -> StoreResult<Option<Record>> {
        let key = key.into();
        let (handle, _, _, _) = self.inner.pieces(&self.name);
        match self.overlay_for(&key) {
            Overlay::Deleted => Ok(None),
            Overlay::Buffered(record) => Ok(Some(record)),
            Overlay::Untouched => handle.get(key).await,
        }
    }

    /// Every visible record: committed state minus tombstones, with
    /// buffered updates applied and buffered inserts appended in insertion
    /// order.
    pub async fn all(&self) -> StoreResult<Vec<Record>> {
        let (handle, validator, _, _) = self.inner.pieces(&self.name);
        let committed = handle.all().await?;

        let state = self.inner.state.lock();
        let buffer = state.buffers.get(&self.name).expect("buffer exists");
        let key_field = validator.key_field();

        let mut out = Vec::with_capacity(committed.len() + buffer.inserts.len());
        let mut present: HashSet<Key> = HashSet::new();
        for record in committed {
            let key = match record.key(key_field) {
                Some(key) => key,
                None => continue,
            };
            if buffer.deletes.contains_key(&key) {
                continue;
            }
            present.insert(key.clone());
            if let Some(pending) = buffer.updates.get(&key) {
                out.push(pending.record.clone());
            } else if let Some(inserted) = buffer.inserts.get(&key) {
                out.push(inserted.clone());
            } else {
                out.push(record);
            }
        }
        let mut appended: HashSet<Key> = HashSet::new();
        for key in &buffer.journal {
            if present.contains(key) || !appended.insert(key.clone()) {
                continue;
            }
            if let Some(record) = buffer.inserts.get(key) {
                out.push(record.clone());
            }
        }
        Ok(out)
    }

    pub async fn find(&self, filter: Value) -> StoreResult<Vec<Record>> {
        let filter = object_fields(&self.name, filter)?;
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|r| matches_filter(r, &filter))
            .collect())
    }

    pub async fn find_one(&self, filter: Value) -> StoreResult<Option<Record>> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    pub async fn count(&self, filter: Option<Value>) -> StoreResult<usize> {
        match filter {
            Some(filter) => Ok(self.find(filter).await?.len()),
            None => Ok(self.all().await?.len()),
        }
    }

    fn overlay_for(&self, key: &Key) -> Overlay {
        let state = self.inner.state.lock();
        let buffer = state.buffers.get(&self.name).expect("buffer exists");
        if buffer.deletes.contains_key(key) {
            Overlay::Deleted
        } else if let Some(record) = buffer.inserts.get(key) {
            Overlay::Buffered(record.clone())
        } else if let Some(pending) = buffer.updates.get(key) {
            Overlay::Buffered(pending.record.clone())
        } else {
            Overlay::Untouched
        }
    }
}

fn attach_ttl(definition: &BucketDefinition, mut record: Record) -> Record {
    if let Some(ttl) = definition.ttl_ms {
        if !record.contains(FIELD_EXPIRES_AT) {
            record.set(FIELD_EXPIRES_AT, Value::from(record.created_at() + ttl));
        }
    }
    record
}

fn extract_key(bucket: &str, validator: &SchemaValidator, record: &Record) -> StoreResult<Key> {
    record.key(validator.key_field()).ok_or_else(|| {
        StoreError::validation(
            bucket,
            vec![ValidationIssue::new(
                validator.key_field(),
                "primary key must be a string or an integer",
                IssueCode::Type,
            )],
        )
    })
}

fn explicit_autoincrement_floor(
    definition: &BucketDefinition,
    record: &Record,
    counter: i64,
) -> i64 {
    let mut floor = counter;
    for (field, spec) in &definition.schema {
        if spec.generated == Some(GeneratedStrategy::Autoincrement) {
            if let Some(id) = record.get(field).and_then(Value::as_i64) {
                if id > floor {
                    floor = id;
                }
            }
        }
    }
    floor
}
