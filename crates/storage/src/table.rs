//! Record table with pluggable iteration order
//!
//! A bucket's table is keyed by primary key and iterates either in
//! ascending key order (`ordered-by-key` buckets, BTreeMap) or in insertion
//! order (the default). Replacing a record keeps its position.

use basalt_core::schema::StorageOrder;
use basalt_core::{Key, Record};
use std::collections::{BTreeMap, HashMap};

/// Key → record map for one bucket.
#[derive(Debug)]
pub enum Table {
    /// Ascending primary-key order
    Ordered(BTreeMap<Key, Record>),
    /// Insertion order
    Insertion(InsertionTable),
}

/// Hash map plus an insertion-order side list.
#[derive(Debug, Default)]
pub struct InsertionTable {
    map: HashMap<Key, Record>,
    order: Vec<Key>,
}

impl Table {
    pub fn new(order: StorageOrder) -> Self {
        match order {
            StorageOrder::OrderedByKey => Table::Ordered(BTreeMap::new()),
            StorageOrder::Unordered => Table::Insertion(InsertionTable::default()),
        }
    }

    pub fn get(&self, key: &Key) -> Option<&Record> {
        match self {
            Table::Ordered(map) => map.get(key),
            Table::Insertion(t) => t.map.get(key),
        }
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        match self {
            Table::Ordered(map) => map.contains_key(key),
            Table::Insertion(t) => t.map.contains_key(key),
        }
    }

    /// Insert or replace. A replaced record keeps its iteration position.
    pub fn insert(&mut self, key: Key, record: Record) -> Option<Record> {
        match self {
            Table::Ordered(map) => map.insert(key, record),
            Table::Insertion(t) => {
                let previous = t.map.insert(key.clone(), record);
                if previous.is_none() {
                    t.order.push(key);
                }
                previous
            }
        }
    }

    pub fn remove(&mut self, key: &Key) -> Option<Record> {
        match self {
            Table::Ordered(map) => map.remove(key),
            Table::Insertion(t) => {
                let removed = t.map.remove(key);
                if removed.is_some() {
                    t.order.retain(|k| k != key);
                }
                removed
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Table::Ordered(map) => map.len(),
            Table::Insertion(t) => t.map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match self {
            Table::Ordered(map) => map.clear(),
            Table::Insertion(t) => {
                t.map.clear();
                t.order.clear();
            }
        }
    }

    /// Iterate in the table's order; double-ended for `last(n)`.
    pub fn iter(&self) -> Box<dyn DoubleEndedIterator<Item = (&Key, &Record)> + '_> {
        match self {
            Table::Ordered(map) => Box::new(map.iter()),
            Table::Insertion(t) => Box::new(
                t.order
                    .iter()
                    .map(move |k| (k, t.map.get(k).expect("order list tracks map"))),
            ),
        }
    }

    /// Keys in iteration order.
    pub fn keys(&self) -> Vec<Key> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: i64) -> Record {
        match json!({"id": id}) {
            serde_json::Value::Object(map) => Record::new(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn insertion_table_iterates_in_arrival_order() {
        let mut t = Table::new(StorageOrder::Unordered);
        t.insert(Key::Int(3), record(3));
        t.insert(Key::Int(1), record(1));
        t.insert(Key::Int(2), record(2));

        let keys: Vec<_> = t.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Key::Int(3), Key::Int(1), Key::Int(2)]);
    }

    #[test]
    fn ordered_table_iterates_by_key() {
        let mut t = Table::new(StorageOrder::OrderedByKey);
        t.insert(Key::Int(3), record(3));
        t.insert(Key::Int(1), record(1));
        t.insert(Key::Int(2), record(2));

        let keys: Vec<_> = t.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Key::Int(1), Key::Int(2), Key::Int(3)]);
    }

    #[test]
    fn replacement_keeps_position() {
        let mut t = Table::new(StorageOrder::Unordered);
        t.insert(Key::Int(1), record(1));
        t.insert(Key::Int(2), record(2));
        let previous = t.insert(Key::Int(1), record(10));
        assert!(previous.is_some());

        let keys: Vec<_> = t.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Key::Int(1), Key::Int(2)]);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn remove_drops_from_order() {
        let mut t = Table::new(StorageOrder::Unordered);
        t.insert(Key::Int(1), record(1));
        t.insert(Key::Int(2), record(2));
        assert!(t.remove(&Key::Int(1)).is_some());
        assert!(t.remove(&Key::Int(1)).is_none());

        assert_eq!(t.keys(), vec![Key::Int(2)]);
    }

    #[test]
    fn reverse_iteration() {
        let mut t = Table::new(StorageOrder::Unordered);
        t.insert(Key::Int(1), record(1));
        t.insert(Key::Int(2), record(2));
        t.insert(Key::Int(3), record(3));

        let last_two: Vec<_> = t.iter().rev().take(2).map(|(k, _)| k.clone()).collect();
        assert_eq!(last_two, vec![Key::Int(3), Key::Int(2)]);
    }

    #[test]
    fn clear_resets_both_variants() {
        for order in [StorageOrder::Unordered, StorageOrder::OrderedByKey] {
            let mut t = Table::new(order);
            t.insert(Key::Int(1), record(1));
            t.clear();
            assert!(t.is_empty());
            assert_eq!(t.iter().count(), 0);
        }
    }
}
