//! Transaction behavior: buffering, overlay reads, optimistic commit,
//! cross-bucket rollback, and event ordering.

use basalt::{BucketDefinition, FieldSpec, GeneratedStrategy, Key, Store, StoreError};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

fn customers() -> BucketDefinition {
    BucketDefinition::builder("id")
        .field("id", FieldSpec::string())
        .field("score", FieldSpec::number())
        .field("email", FieldSpec::string().unique())
        .build()
}

fn orders() -> BucketDefinition {
    BucketDefinition::builder("id")
        .field(
            "id",
            FieldSpec::number().generated(GeneratedStrategy::Autoincrement),
        )
        .field("label", FieldSpec::string())
        .build()
}

#[tokio::test]
async fn commit_applies_buffered_writes() {
    let store = Store::open().unwrap();
    store.define_bucket("customers", customers()).await.unwrap();
    let bucket = store.bucket("customers").unwrap();

    store
        .transaction(|tx| async move {
            let customers = tx.bucket("customers")?;
            customers.insert(json!({"id": "c1", "score": 1})).await?;
            customers.insert(json!({"id": "c2", "score": 2})).await?;
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(bucket.count(None).await.unwrap(), 2);
    store.stop().await.unwrap();
}

#[tokio::test]
async fn nothing_visible_before_commit() {
    let store = Store::open().unwrap();
    store.define_bucket("customers", customers()).await.unwrap();
    let bucket = store.bucket("customers").unwrap();

    let tx = store.begin_transaction();
    let customers = tx.bucket("customers").unwrap();
    customers.insert(json!({"id": "c1"})).await.unwrap();

    assert_eq!(bucket.count(None).await.unwrap(), 0);
    tx.commit().await.unwrap();
    assert_eq!(bucket.count(None).await.unwrap(), 1);

    store.stop().await.unwrap();
}

#[tokio::test]
async fn reads_overlay_own_writes() {
    let store = Store::open().unwrap();
    store.define_bucket("customers", customers()).await.unwrap();
    let bucket = store.bucket("customers").unwrap();
    bucket
        .insert(json!({"id": "existing", "score": 5}))
        .await
        .unwrap();

    let tx = store.begin_transaction();
    let customers = tx.bucket("customers").unwrap();

    customers.insert(json!({"id": "new", "score": 1})).await.unwrap();
    customers
        .update("existing", json!({"score": 50}))
        .await
        .unwrap();

    // Own writes visible through every read path.
    let inserted = customers.get("new").await.unwrap().unwrap();
    assert_eq!(inserted.get("score"), Some(&json!(1)));
    let updated = customers.get("existing").await.unwrap().unwrap();
    assert_eq!(updated.get("score"), Some(&json!(50)));
    assert_eq!(customers.count(None).await.unwrap(), 2);

    customers.delete("existing").await.unwrap();
    assert!(customers.get("existing").await.unwrap().is_none());
    assert_eq!(customers.count(None).await.unwrap(), 1);

    // Real bucket untouched while buffering.
    assert_eq!(
        bucket.get("existing").await.unwrap().unwrap().get("score"),
        Some(&json!(5))
    );

    tx.commit().await.unwrap();
    assert!(bucket.get("existing").await.unwrap().is_none());
    assert!(bucket.get("new").await.unwrap().is_some());

    store.stop().await.unwrap();
}

#[tokio::test]
async fn deleting_a_buffered_insert_cancels_it() {
    let store = Store::open().unwrap();
    store.define_bucket("customers", customers()).await.unwrap();
    let bucket = store.bucket("customers").unwrap();

    store
        .transaction(|tx| async move {
            let customers = tx.bucket("customers")?;
            customers.insert(json!({"id": "c1"})).await?;
            customers.delete("c1").await?;
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(bucket.count(None).await.unwrap(), 0);
    store.stop().await.unwrap();
}

#[tokio::test]
async fn version_conflict_rolls_back_and_emits_nothing() {
    let store = Store::open().unwrap();
    store.define_bucket("customers", customers()).await.unwrap();
    let bucket = store.bucket("customers").unwrap();
    bucket.insert(json!({"id": "c1", "score": 0})).await.unwrap();

    let events = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&events);
    let _sub = store
        .on("bucket.*.*", move |_, topic| sink.lock().push(topic.into()))
        .unwrap();

    let tx = store.begin_transaction();
    let customers = tx.bucket("customers").unwrap();
    // Captures expectedVersion = 1.
    customers.update("c1", json!({"score": 100})).await.unwrap();

    // External write bumps the version to 2 before the commit.
    bucket.update("c1", json!({"score": 50})).await.unwrap();
    events.lock().clear();

    let err = tx.commit().await.unwrap_err();
    match err {
        StoreError::TransactionConflict { bucket, key, .. } => {
            assert_eq!(bucket, "customers");
            assert_eq!(key, Key::from("c1"));
        }
        other => panic!("unexpected: {}", other),
    }

    let current = bucket.get("c1").await.unwrap().unwrap();
    assert_eq!(current.get("score"), Some(&json!(50)));
    assert_eq!(current.version(), 2);
    assert!(events.lock().is_empty());

    store.stop().await.unwrap();
}

#[tokio::test]
async fn failed_bucket_rolls_back_earlier_buckets() {
    let store = Store::open().unwrap();
    store.define_bucket("customers", customers()).await.unwrap();
    store.define_bucket("orders", orders()).await.unwrap();
    let customers_bucket = store.bucket("customers").unwrap();
    let orders_bucket = store.bucket("orders").unwrap();
    orders_bucket.insert(json!({"label": "seed"})).await.unwrap();

    let tx = store.begin_transaction();
    let customers = tx.bucket("customers").unwrap();
    let orders = tx.bucket("orders").unwrap();
    customers.insert(json!({"id": "c1"})).await.unwrap();
    // Conflicting update: version will move underneath.
    orders.update(Key::Int(1), json!({"label": "tx"})).await.unwrap();
    orders_bucket
        .update(Key::Int(1), json!({"label": "external"}))
        .await
        .unwrap();

    assert!(tx.commit().await.is_err());

    // Customers committed first, then rolled back.
    assert_eq!(customers_bucket.count(None).await.unwrap(), 0);
    let order = orders_bucket.get(Key::Int(1)).await.unwrap().unwrap();
    assert_eq!(order.get("label"), Some(&json!("external")));

    store.stop().await.unwrap();
}

#[tokio::test]
async fn callback_error_abandons_the_buffer() {
    let store = Store::open().unwrap();
    store.define_bucket("customers", customers()).await.unwrap();
    let bucket = store.bucket("customers").unwrap();

    let result: Result<(), StoreError> = store
        .transaction(|tx| async move {
            let customers = tx.bucket("customers")?;
            customers.insert(json!({"id": "c1"})).await?;
            Err(StoreError::persistence("application bail-out"))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(bucket.count(None).await.unwrap(), 0);
    store.stop().await.unwrap();
}

#[tokio::test]
async fn commit_is_one_shot() {
    let store = Store::open().unwrap();
    store.define_bucket("customers", customers()).await.unwrap();

    let tx = store.begin_transaction();
    let customers = tx.bucket("customers").unwrap();
    customers.insert(json!({"id": "c1"})).await.unwrap();
    tx.commit().await.unwrap();

    assert!(matches!(
        tx.commit().await.unwrap_err(),
        StoreError::TransactionAlreadyCommitted
    ));
    store.stop().await.unwrap();
}

#[tokio::test]
async fn events_publish_after_every_bucket_commits() {
    let store = Store::open().unwrap();
    store.define_bucket("customers", customers()).await.unwrap();
    store.define_bucket("orders", orders()).await.unwrap();

    let topics = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&topics);
    let _sub = store
        .on("bucket.*.*", move |_, topic| sink.lock().push(topic.into()))
        .unwrap();

    store
        .transaction(|tx| async move {
            let customers = tx.bucket("customers")?;
            let orders = tx.bucket("orders")?;
            customers.insert(json!({"id": "c1"})).await?;
            orders.insert(json!({"label": "first"})).await?;
            customers.insert(json!({"id": "c2"})).await?;
            Ok(())
        })
        .await
        .unwrap();

    // Bucket-then-operation order: both customer inserts, then the order's.
    assert_eq!(
        topics.lock().as_slice(),
        &[
            "bucket.customers.inserted".to_string(),
            "bucket.customers.inserted".to_string(),
            "bucket.orders.inserted".to_string(),
        ]
    );

    store.stop().await.unwrap();
}

#[tokio::test]
async fn repeated_updates_keep_earliest_expected_version() {
    let store = Store::open().unwrap();
    store.define_bucket("customers", customers()).await.unwrap();
    let bucket = store.bucket("customers").unwrap();
    bucket.insert(json!({"id": "c1", "score": 0})).await.unwrap();

    store
        .transaction(|tx| async move {
            let customers = tx.bucket("customers")?;
            customers.update("c1", json!({"score": 1})).await?;
            customers.update("c1", json!({"score": 2})).await?;
            customers.update("c1", json!({"score": 3})).await?;
            Ok(())
        })
        .await
        .unwrap();

    let current = bucket.get("c1").await.unwrap().unwrap();
    assert_eq!(current.get("score"), Some(&json!(3)));

    store.stop().await.unwrap();
}

#[tokio::test]
async fn transactional_autoincrement_advances_the_bucket_counter() {
    let store = Store::open().unwrap();
    store.define_bucket("orders", orders()).await.unwrap();
    let bucket = store.bucket("orders").unwrap();

    store
        .transaction(|tx| async move {
            let orders = tx.bucket("orders")?;
            let first = orders.insert(json!({"label": "a"})).await?;
            let second = orders.insert(json!({"label": "b"})).await?;
            assert_eq!(first.get("id"), Some(&json!(1)));
            assert_eq!(second.get("id"), Some(&json!(2)));
            Ok(())
        })
        .await
        .unwrap();

    // Counter advanced at commit: the next direct insert continues.
    let third = bucket.insert(json!({"label": "c"})).await.unwrap();
    assert_eq!(third.get("id"), Some(&json!(3)));

    store.stop().await.unwrap();
}

#[tokio::test]
async fn unique_collision_surfaces_at_commit() {
    let store = Store::open().unwrap();
    store.define_bucket("customers", customers()).await.unwrap();
    let bucket = store.bucket("customers").unwrap();
    bucket
        .insert(json!({"id": "c1", "email": "dup@x.com"}))
        .await
        .unwrap();

    let tx = store.begin_transaction();
    let customers = tx.bucket("customers").unwrap();
    // Accepted into the buffer; the check is deferred.
    customers
        .insert(json!({"id": "c2", "email": "dup@x.com"}))
        .await
        .unwrap();

    let err = tx.commit().await.unwrap_err();
    match err {
        StoreError::TransactionConflict { key, field, .. } => {
            assert_eq!(key, Key::from("c2"));
            assert_eq!(field, Some("email".to_string()));
        }
        other => panic!("unexpected: {}", other),
    }
    assert_eq!(bucket.count(None).await.unwrap(), 1);

    store.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_bucket_fails_fast() {
    let store = Store::open().unwrap();
    let tx = store.begin_transaction();
    assert!(matches!(
        tx.bucket("ghost").unwrap_err(),
        StoreError::BucketNotDefined { .. }
    ));
    store.stop().await.unwrap();
}
