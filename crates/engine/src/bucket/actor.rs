//! The bucket actor task
//!
//! Owns the table, indexes, and autoincrement counter for one bucket and
//! processes messages strictly one at a time. Single-operation mutations
//! publish their events directly; `commit_batch` instead returns events to
//! the transaction engine, which publishes only after every bucket commits.

use super::message::{AggregateOp, BucketMessage, CommitOp, CommitOutcome, UndoOp};
use super::{matches_filter, BucketHandle, Page};
use crate::bus::EventBus;
use crate::event::StoreEvent;
use basalt_core::schema::{BucketDefinition, GeneratedStrategy, StorageOrder};
use basalt_core::{
    Fields, IssueCode, Key, Record, SchemaValidator, StoreError, StoreResult, ValidationIssue,
    FIELD_EXPIRES_AT,
};
use basalt_durability::SnapshotState;
use basalt_storage::{IndexKey, IndexManager, Table};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Spawn a bucket actor task and return a handle to it.
pub(crate) fn spawn_bucket(
    name: &str,
    definition: Arc<BucketDefinition>,
    validator: Arc<SchemaValidator>,
    bus: EventBus,
    initial: Option<SnapshotState>,
) -> BucketHandle {
    BucketActor::spawn(name, definition, validator, bus, initial)
}

pub(crate) struct BucketActor {
    name: String,
    definition: Arc<BucketDefinition>,
    validator: Arc<SchemaValidator>,
    table: Table,
    indexes: IndexManager,
    counter: i64,
    bus: EventBus,
}

impl BucketActor {
    /// Spawn the actor task and return a handle to it.
    ///
    /// `initial` is restored state from a snapshot: the counter resumes and
    /// indexes (unique included) are rebuilt from the records. Restoring is
    /// silent; no events are published.
    pub(crate) fn spawn(
        name: &str,
        definition: Arc<BucketDefinition>,
        validator: Arc<SchemaValidator>,
        bus: EventBus,
        initial: Option<SnapshotState>,
    ) -> BucketHandle {
        let mut actor = BucketActor {
            name: name.to_string(),
            table: Table::new(definition.order),
            indexes: IndexManager::new(name, &definition),
            counter: 0,
            definition,
            validator,
            bus,
        };

        if let Some(state) = initial {
            actor.counter = state.autoincrement_counter;
            for (key, record) in state.records {
                match actor.indexes.add_record(&key, &record) {
                    Ok(()) => {
                        actor.advance_counter_from(&record);
                        actor.table.insert(key, record);
                    }
                    Err(e) => {
                        warn!(bucket = %actor.name, key = %key, "skipping snapshot row: {}", e)
                    }
                }
            }
            debug!(bucket = %actor.name, records = actor.table.len(), "restored from snapshot");
        }

        let (sender, mut receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                if let BucketMessage::Stop { reply } = message {
                    let _ = reply.send(());
                    break;
                }
                actor.handle(message);
            }
            debug!(bucket = %actor.name, "bucket actor stopped");
        });

        BucketHandle::new(name, sender)
    }

    fn handle(&mut self, message: BucketMessage) {
        match message {
            BucketMessage::Insert { data, reply } => {
                let _ = reply.send(self.insert(data));
            }
            BucketMessage::Get { key, reply } => {
                let _ = reply.send(self.table.get(&key).cloned());
            }
            BucketMessage::Update { key, changes, reply } => {
                let _ = reply.send(self.update(key, changes));
            }
            BucketMessage::Delete { key, reply } => {
                let _ = reply.send(self.delete(key));
            }
            BucketMessage::Clear { reply } => {
                self.table.clear();
                self.indexes.clear();
                let _ = reply.send(());
            }
            BucketMessage::All { reply } => {
                let _ = reply.send(self.table.iter().map(|(_, r)| r.clone()).collect());
            }
            BucketMessage::Where { filter, reply } => {
                let _ = reply.send(self.matched(&filter));
            }
            BucketMessage::FindOne { filter, reply } => {
                let _ = reply.send(self.matched(&filter).into_iter().next());
            }
            BucketMessage::Count { filter, reply } => {
                let count = match filter {
                    Some(filter) => self.matched(&filter).len(),
                    None => self.table.len(),
                };
                let _ = reply.send(count);
            }
            BucketMessage::First { n, reply } => {
                let _ = reply.send(self.table.iter().take(n).map(|(_, r)| r.clone()).collect());
            }
            BucketMessage::Last { n, reply } => {
                let mut records: Vec<Record> =
                    self.table.iter().rev().take(n).map(|(_, r)| r.clone()).collect();
                records.reverse();
                let _ = reply.send(records);
            }
            BucketMessage::Paginate { after, limit, reply } => {
                let _ = reply.send(self.paginate(after, limit));
            }
            BucketMessage::Aggregate {
                op,
                field,
                filter,
                reply,
            } => {
                let _ = reply.send(self.aggregate(op, &field, filter));
            }
            BucketMessage::PurgeExpired { reply } => {
                let _ = reply.send(self.purge_expired());
            }
            BucketMessage::Snapshot { reply } => {
                let _ = reply.send(SnapshotState {
                    records: self
                        .table
                        .iter()
                        .map(|(k, r)| (k.clone(), r.clone()))
                        .collect(),
                    autoincrement_counter: self.counter,
                });
            }
            BucketMessage::Counter { reply } => {
                let _ = reply.send(self.counter);
            }
            BucketMessage::CommitBatch {
                ops,
                counter_update,
                reply,
            } => {
                let _ = reply.send(self.commit_batch(ops, counter_update));
            }
            BucketMessage::RollbackBatch { undo, reply } => {
                self.rollback_batch(undo);
                let _ = reply.send(());
            }
            BucketMessage::Stop { .. } => unreachable!("handled by the actor loop"),
        }
    }

    // =========================================================================
    // Single operations
    // =========================================================================

    fn insert(&mut self, data: Fields) -> StoreResult<Record> {
        let mut local = self.counter;
        let record = {
            let mut next = || {
                local += 1;
                local
            };
            self.validator.prepare_insert(data, &mut next)?
        };
        let record = self.attach_ttl(record);

        let key = self.extract_key(&record)?;
        if self.table.contains_key(&key) {
            return Err(StoreError::unique_constraint(
                &self.name,
                self.validator.key_field(),
                key.to_value(),
            ));
        }
        if let Err((field, value)) = self.indexes.check_unique(&record, None) {
            return Err(StoreError::unique_constraint(&self.name, field, value));
        }

        // Checks are done; an at-capacity bucket now sheds its oldest record.
        let evicted = match self.definition.max_size {
            Some(max) if self.table.len() >= max => self.evict_oldest(),
            _ => None,
        };

        self.indexes
            .add_record(&key, &record)
            .expect("unique checks already passed");
        self.table.insert(key.clone(), record.clone());
        self.counter = self.counter.max(local);
        self.advance_counter_from(&record);

        if let Some((evicted_key, evicted_record)) = evicted {
            self.bus.publish(Arc::new(StoreEvent::Deleted {
                bucket: self.name.clone(),
                key: evicted_key,
                record: evicted_record,
            }));
        }
        self.bus.publish(Arc::new(StoreEvent::Inserted {
            bucket: self.name.clone(),
            key,
            record: record.clone(),
        }));
        Ok(record)
    }

    fn update(&mut self, key: Key, changes: Fields) -> StoreResult<Record> {
        let old = self
            .table
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::record_not_found(&self.name, key.clone()))?;
        let new = self.validator.prepare_update(&old, changes)?;
        self.indexes.update_record(&key, &old, &new)?;
        self.table.insert(key.clone(), new.clone());

        self.bus.publish(Arc::new(StoreEvent::Updated {
            bucket: self.name.clone(),
            key,
            old_record: old,
            new_record: new.clone(),
        }));
        Ok(new)
    }

    fn delete(&mut self, key: Key) -> Option<Record> {
        let record = self.table.remove(&key)?;
        self.indexes.remove_record(&key, &record);
        self.bus.publish(Arc::new(StoreEvent::Deleted {
            bucket: self.name.clone(),
            key,
            record: record.clone(),
        }));
        Some(record)
    }

    fn purge_expired(&mut self) -> usize {
        let now = basalt_core::now_millis();
        let expired: Vec<Key> = self
            .table
            .iter()
            .filter(|(_, r)| r.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            self.delete(key);
        }
        count
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Records matching a strict-equality filter.
    ///
    /// One indexed filter field (with an indexable value) seeds the
    /// candidate set; every candidate is post-filtered against the whole
    /// filter. Without a usable seed the table is scanned.
    fn matched(&self, filter: &Fields) -> Vec<Record> {
        let seed = filter
            .iter()
            .find(|(field, value)| {
                self.indexes.is_indexed(field) && IndexKey::from_value(value).is_some()
            })
            .map(|(field, value)| (field.clone(), value.clone()));

        match seed {
            Some((field, value)) => {
                let mut keys: Vec<Key> = self.indexes.lookup(&field, &value).into_iter().collect();
                keys.sort();
                keys.iter()
                    .filter_map(|k| self.table.get(k))
                    .filter(|r| matches_filter(r, filter))
                    .cloned()
                    .collect()
            }
            None => self
                .table
                .iter()
                .filter(|(_, r)| matches_filter(r, filter))
                .map(|(_, r)| r.clone())
                .collect(),
        }
    }

    fn paginate(&self, after: Option<Key>, limit: usize) -> Page {
        let mut records = Vec::new();
        let mut has_more = false;
        let mut past_cursor = after.is_none();

        for (key, record) in self.table.iter() {
            if !past_cursor {
                let skip = match self.definition.order {
                    StorageOrder::OrderedByKey => Some(key) <= after.as_ref(),
                    StorageOrder::Unordered => {
                        if Some(key) == after.as_ref() {
                            past_cursor = true;
                        }
                        true
                    }
                };
                if skip {
                    continue;
                }
                past_cursor = true;
            }
            if records.len() == limit {
                has_more = true;
                break;
            }
            records.push((key.clone(), record.clone()));
        }

        Page {
            next_cursor: records.last().map(|(k, _)| k.clone()),
            records: records.into_iter().map(|(_, r)| r).collect(),
            has_more,
        }
    }

    fn aggregate(&self, op: AggregateOp, field: &str, filter: Option<Fields>) -> Option<f64> {
        let records = match filter {
            Some(filter) => self.matched(&filter),
            None => self.table.iter().map(|(_, r)| r.clone()).collect(),
        };
        let values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.get(field).and_then(Value::as_f64))
            .collect();

        match op {
            AggregateOp::Sum => Some(values.iter().sum()),
            AggregateOp::Avg => {
                if values.is_empty() {
                    Some(0.0)
                } else {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                }
            }
            AggregateOp::Min => values.iter().copied().reduce(f64::min),
            AggregateOp::Max => values.iter().copied().reduce(f64::max),
        }
    }

    // =========================================================================
    // Two-phase batch commit
    // =========================================================================

    /// Validate every operation against current state, then apply all of
    /// them, producing the events to publish and the undo log.
    ///
    /// Phase 1 failures leave the bucket untouched. A phase-2 failure (a
    /// unique collision between two operations of the same batch) rolls the
    /// already-applied prefix back before propagating.
    fn commit_batch(
        &mut self,
        ops: Vec<CommitOp>,
        counter_update: Option<i64>,
    ) -> StoreResult<CommitOutcome> {
        // Phase 1: validate.
        for op in &ops {
            match op {
                CommitOp::Insert { key, record } => {
                    if self.table.contains_key(key) {
                        return Err(self.conflict(key, None));
                    }
                    if let Err((field, _)) = self.indexes.check_unique(record, None) {
                        return Err(self.conflict(key, Some(field)));
                    }
                }
                CommitOp::Update {
                    key,
                    record,
                    expected_version,
                } => {
                    let current = self
                        .table
                        .get(key)
                        .ok_or_else(|| self.conflict(key, None))?;
                    if current.version() != *expected_version {
                        return Err(self.conflict(key, None));
                    }
                    if let Err((field, _)) = self.indexes.check_unique(record, Some(key)) {
                        return Err(self.conflict(key, Some(field)));
                    }
                }
                CommitOp::Delete {
                    key,
                    expected_version,
                } => {
                    // A vanished record makes the delete an idempotent no-op.
                    if let Some(current) = self.table.get(key) {
                        if current.version() != *expected_version {
                            return Err(self.conflict(key, None));
                        }
                    }
                }
            }
        }

        // Phase 2: apply.
        let mut events = Vec::with_capacity(ops.len());
        let mut undo = Vec::with_capacity(ops.len());
        for op in ops {
            let applied = self.apply_commit_op(op, &mut events, &mut undo);
            if let Err(e) = applied {
                warn!(bucket = %self.name, "batch apply failed mid-way; rolling back: {}", e);
                self.rollback_batch(std::mem::take(&mut undo));
                return Err(e);
            }
        }

        if let Some(next) = counter_update {
            if next > self.counter {
                self.counter = next;
            }
        }

        Ok(CommitOutcome { events, undo })
    }

    fn apply_commit_op(
        &mut self,
        op: CommitOp,
        events: &mut Vec<StoreEvent>,
        undo: &mut Vec<UndoOp>,
    ) -> StoreResult<()> {
        match op {
            CommitOp::Insert { key, record } => {
                self.indexes.add_record(&key, &record)?;
                self.table.insert(key.clone(), record.clone());
                events.push(StoreEvent::Inserted {
                    bucket: self.name.clone(),
                    key: key.clone(),
                    record,
                });
                undo.push(UndoOp::RemoveInserted { key });
            }
            CommitOp::Update { key, record, .. } => {
                let old = self
                    .table
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| self.conflict(&key, None))?;
                self.indexes.update_record(&key, &old, &record)?;
                self.table.insert(key.clone(), record.clone());
                events.push(StoreEvent::Updated {
                    bucket: self.name.clone(),
                    key: key.clone(),
                    old_record: old.clone(),
                    new_record: record,
                });
                undo.push(UndoOp::RestoreUpdated { key, record: old });
            }
            CommitOp::Delete { key, .. } => {
                if let Some(record) = self.table.remove(&key) {
                    self.indexes.remove_record(&key, &record);
                    events.push(StoreEvent::Deleted {
                        bucket: self.name.clone(),
                        key: key.clone(),
                        record: record.clone(),
                    });
                    undo.push(UndoOp::RestoreDeleted { key, record });
                }
            }
        }
        Ok(())
    }

    /// Apply an undo log, newest operation first. No validation, no events.
    fn rollback_batch(&mut self, undo: Vec<UndoOp>) {
        for op in undo.into_iter().rev() {
            match op {
                UndoOp::RemoveInserted { key } => {
                    if let Some(record) = self.table.remove(&key) {
                        self.indexes.remove_record(&key, &record);
                    }
                }
                UndoOp::RestoreUpdated { key, record } => {
                    if let Some(current) = self.table.get(&key).cloned() {
                        self.indexes.remove_record(&key, &current);
                    }
                    self.indexes.force_add(&key, &record);
                    self.table.insert(key, record);
                }
                UndoOp::RestoreDeleted { key, record } => {
                    self.indexes.force_add(&key, &record);
                    self.table.insert(key, record);
                }
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn conflict(&self, key: &Key, field: Option<String>) -> StoreError {
        StoreError::transaction_conflict(&self.name, key.clone(), field)
    }

    fn attach_ttl(&self, mut record: Record) -> Record {
        if let Some(ttl) = self.definition.ttl_ms {
            if !record.contains(FIELD_EXPIRES_AT) {
                record.set(FIELD_EXPIRES_AT, Value::from(record.created_at() + ttl));
            }
        }
        record
    }

    fn extract_key(&self, record: &Record) -> StoreResult<Key> {
        record.key(self.validator.key_field()).ok_or_else(|| {
            StoreError::validation(
                &self.name,
                vec![ValidationIssue::new(
                    self.validator.key_field(),
                    "primary key must be a string or an integer",
                    IssueCode::Type,
                )],
            )
        })
    }

    /// Oldest record by `_createdAt`; earliest-iterated wins ties.
    fn evict_oldest(&mut self) -> Option<(Key, Record)> {
        let victim = self
            .table
            .iter()
            .fold(None::<(Key, i64)>, |best, (key, record)| match best {
                Some((_, oldest)) if oldest <= record.created_at() => best,
                _ => Some((key.clone(), record.created_at())),
            })
            .map(|(key, _)| key)?;
        let record = self.table.remove(&victim)?;
        self.indexes.remove_record(&victim, &record);
        Some((victim, record))
    }

    /// Keep the counter at or above any explicitly supplied autoincrement id.
    fn advance_counter_from(&mut self, record: &Record) {
        for (field, spec) in &self.definition.schema {
            if spec.generated == Some(GeneratedStrategy::Autoincrement) {
                if let Some(id) = record.get(field).and_then(Value::as_i64) {
                    if id > self.counter {
                        self.counter = id;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::schema::FieldSpec;
    use serde_json::json;

    fn actor() -> BucketActor {
        let definition = Arc::new(
            BucketDefinition::builder("id")
                .field("id", FieldSpec::string())
                .field("email", FieldSpec::string().unique())
                .field("score", FieldSpec::number())
                .index("score")
                .build(),
        );
        let validator = Arc::new(SchemaValidator::new("users", &definition).unwrap());
        BucketActor {
            name: "users".to_string(),
            table: Table::new(definition.order),
            indexes: IndexManager::new("users", &definition),
            counter: 0,
            definition,
            validator,
            bus: EventBus::new(),
        }
    }

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn seeded(actor: &mut BucketActor, id: &str, email: &str) -> Record {
        actor
            .insert(fields(json!({"id": id, "email": email, "score": 1})))
            .unwrap()
    }

    #[test]
    fn commit_batch_applies_all_and_returns_undo() {
        let mut a = actor();
        let existing = seeded(&mut a, "u1", "a@x");

        let updated = {
            let mut map = existing.fields().clone();
            map.insert("score".into(), json!(9));
            map.insert("_version".into(), json!(2));
            Record::new(map)
        };
        let inserted = Record::new(fields(json!({
            "id": "u2", "email": "b@x", "_version": 1, "_createdAt": 5, "_updatedAt": 5
        })));

        let outcome = a
            .commit_batch(
                vec![
                    CommitOp::Update {
                        key: Key::from("u1"),
                        record: updated,
                        expected_version: 1,
                    },
                    CommitOp::Insert {
                        key: Key::from("u2"),
                        record: inserted,
                    },
                ],
                Some(7),
            )
            .unwrap();

        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.undo.len(), 2);
        assert_eq!(a.table.len(), 2);
        assert_eq!(a.counter, 7);
        assert_eq!(
            a.table.get(&Key::from("u1")).unwrap().get("score"),
            Some(&json!(9))
        );
    }

    #[test]
    fn commit_batch_version_mismatch_changes_nothing() {
        let mut a = actor();
        let existing = seeded(&mut a, "u1", "a@x");

        let err = a
            .commit_batch(
                vec![CommitOp::Update {
                    key: Key::from("u1"),
                    record: existing.clone(),
                    expected_version: 99,
                }],
                None,
            )
            .unwrap_err();
        match err {
            StoreError::TransactionConflict { bucket, key, field } => {
                assert_eq!(bucket, "users");
                assert_eq!(key, Key::from("u1"));
                assert_eq!(field, None);
            }
            other => panic!("unexpected: {}", other),
        }
        assert_eq!(a.table.get(&Key::from("u1")).unwrap().version(), 1);
    }

    #[test]
    fn commit_batch_insert_collision_is_a_conflict() {
        let mut a = actor();
        seeded(&mut a, "u1", "a@x");

        let clone_key = Record::new(fields(json!({
            "id": "u1", "email": "z@x", "_version": 1, "_createdAt": 5, "_updatedAt": 5
        })));
        let err = a
            .commit_batch(
                vec![CommitOp::Insert {
                    key: Key::from("u1"),
                    record: clone_key,
                }],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::TransactionConflict { .. }));

        let unique_clash = Record::new(fields(json!({
            "id": "u9", "email": "a@x", "_version": 1, "_createdAt": 5, "_updatedAt": 5
        })));
        let err = a
            .commit_batch(
                vec![CommitOp::Insert {
                    key: Key::from("u9"),
                    record: unique_clash,
                }],
                None,
            )
            .unwrap_err();
        match err {
            StoreError::TransactionConflict { field, .. } => {
                assert_eq!(field, Some("email".to_string()))
            }
            other => panic!("unexpected: {}", other),
        }
        assert_eq!(a.table.len(), 1);
    }

    #[test]
    fn commit_batch_missing_delete_is_idempotent() {
        let mut a = actor();
        let outcome = a
            .commit_batch(
                vec![CommitOp::Delete {
                    key: Key::from("ghost"),
                    expected_version: 3,
                }],
                None,
            )
            .unwrap();
        assert!(outcome.events.is_empty());
        assert!(outcome.undo.is_empty());
    }

    #[test]
    fn commit_batch_delete_version_mismatch_fails() {
        let mut a = actor();
        seeded(&mut a, "u1", "a@x");
        let err = a
            .commit_batch(
                vec![CommitOp::Delete {
                    key: Key::from("u1"),
                    expected_version: 2,
                }],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::TransactionConflict { .. }));
        assert_eq!(a.table.len(), 1);
    }

    #[test]
    fn rollback_restores_prior_state() {
        let mut a = actor();
        let original = seeded(&mut a, "u1", "a@x");

        let updated = {
            let mut map = original.fields().clone();
            map.insert("email".into(), json!("new@x"));
            map.insert("_version".into(), json!(2));
            Record::new(map)
        };
        let inserted = Record::new(fields(json!({
            "id": "u2", "email": "b@x", "_version": 1, "_createdAt": 5, "_updatedAt": 5
        })));
        let outcome = a
            .commit_batch(
                vec![
                    CommitOp::Update {
                        key: Key::from("u1"),
                        record: updated,
                        expected_version: 1,
                    },
                    CommitOp::Insert {
                        key: Key::from("u2"),
                        record: inserted,
                    },
                    CommitOp::Delete {
                        key: Key::from("ghost"),
                        expected_version: 1,
                    },
                ],
                None,
            )
            .unwrap();

        a.rollback_batch(outcome.undo);
        assert_eq!(a.table.len(), 1);
        let restored = a.table.get(&Key::from("u1")).unwrap();
        assert_eq!(restored.get("email"), Some(&json!("a@x")));
        assert_eq!(restored.version(), 1);
        // Unique index points at the restored value again.
        assert_eq!(a.indexes.lookup("email", &json!("a@x")).len(), 1);
        assert!(a.indexes.lookup("email", &json!("new@x")).is_empty());
    }

    #[test]
    fn phase_two_inter_batch_unique_collision_rolls_back() {
        let mut a = actor();
        let first = Record::new(fields(json!({
            "id": "u1", "email": "dup@x", "_version": 1, "_createdAt": 5, "_updatedAt": 5
        })));
        let second = Record::new(fields(json!({
            "id": "u2", "email": "dup@x", "_version": 1, "_createdAt": 6, "_updatedAt": 6
        })));
        let err = a
            .commit_batch(
                vec![
                    CommitOp::Insert {
                        key: Key::from("u1"),
                        record: first,
                    },
                    CommitOp::Insert {
                        key: Key::from("u2"),
                        record: second,
                    },
                ],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueConstraint { .. }));
        // The applied prefix was undone.
        assert_eq!(a.table.len(), 0);
        assert!(a.indexes.lookup("email", &json!("dup@x")).is_empty());
    }

    #[test]
    fn eviction_removes_oldest_created() {
        let definition = Arc::new(
            BucketDefinition::builder("id")
                .field("id", FieldSpec::string())
                .max_size(2)
                .build(),
        );
        let validator = Arc::new(SchemaValidator::new("logs", &definition).unwrap());
        let mut a = BucketActor {
            name: "logs".to_string(),
            table: Table::new(definition.order),
            indexes: IndexManager::new("logs", &definition),
            counter: 0,
            definition,
            validator,
            bus: EventBus::new(),
        };

        a.insert(fields(json!({"id": "a"}))).unwrap();
        a.insert(fields(json!({"id": "b"}))).unwrap();
        a.insert(fields(json!({"id": "c"}))).unwrap();

        assert_eq!(a.table.len(), 2);
        assert!(a.table.get(&Key::from("a")).is_none());
        assert!(a.table.get(&Key::from("b")).is_some());
        assert!(a.table.get(&Key::from("c")).is_some());
    }

    #[test]
    fn counter_survives_failed_insert() {
        let definition = Arc::new(
            BucketDefinition::builder("id")
                .field(
                    "id",
                    FieldSpec::number().generated(GeneratedStrategy::Autoincrement),
                )
                .field("label", FieldSpec::string().required())
                .build(),
        );
        let validator = Arc::new(SchemaValidator::new("orders", &definition).unwrap());
        let mut a = BucketActor {
            name: "orders".to_string(),
            table: Table::new(definition.order),
            indexes: IndexManager::new("orders", &definition),
            counter: 0,
            definition,
            validator,
            bus: EventBus::new(),
        };

        a.insert(fields(json!({"label": "first"}))).unwrap();
        assert_eq!(a.counter, 1);
        // Missing required label: rejected, counter untouched.
        assert!(a.insert(fields(json!({}))).is_err());
        assert_eq!(a.counter, 1);
        let next = a.insert(fields(json!({"label": "second"}))).unwrap();
        assert_eq!(next.get("id"), Some(&json!(2)));
    }
}
