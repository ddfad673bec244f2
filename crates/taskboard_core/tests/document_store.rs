use serde_json::{json, Value};
use std::time::Duration;
use taskboard_core::store::migrations::latest_version;
use taskboard_core::store::{
    Direction, DocumentStore, FieldMap, FieldValue, Query, SnapshotEvent, SqliteDocumentStore,
    StoreError, WriteFields,
};

fn fields(text: &str) -> WriteFields {
    WriteFields::from([
        ("text".to_string(), FieldValue::from(text)),
        ("createdAt".to_string(), FieldValue::ServerTimestamp),
    ])
}

fn patch(value: Value) -> FieldMap {
    value.as_object().cloned().unwrap()
}

fn texts(event: Option<SnapshotEvent>) -> Vec<String> {
    match event {
        Some(SnapshotEvent::Snapshot(documents)) => documents
            .iter()
            .map(|doc| doc.fields["text"].as_str().unwrap().to_string())
            .collect(),
        other => panic!("expected snapshot, got {other:?}"),
    }
}

fn newest_first() -> Query {
    Query::collection("todos").order_by("createdAt", Direction::Descending)
}

#[test]
fn add_assigns_id_and_server_timestamp() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();

    let first = store.add_document("todos", fields("first")).unwrap();
    let second = store.add_document("todos", fields("second")).unwrap();
    assert_ne!(first, second);

    let first_doc = store.get_document("todos", &first).unwrap().unwrap();
    let second_doc = store.get_document("todos", &second).unwrap().unwrap();
    let first_ts = first_doc.fields["createdAt"].as_i64().unwrap();
    let second_ts = second_doc.fields["createdAt"].as_i64().unwrap();
    assert!(first_ts > 0);
    assert!(second_ts > first_ts);
}

#[test]
fn query_orders_by_field_in_both_directions() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    for text in ["a", "b", "c"] {
        store.add_document("todos", fields(text)).unwrap();
    }
    store.add_document("archive", fields("elsewhere")).unwrap();

    let newest: Vec<_> = store
        .query_documents(&newest_first())
        .unwrap()
        .into_iter()
        .map(|doc| doc.fields["text"].clone())
        .collect();
    assert_eq!(newest, vec![json!("c"), json!("b"), json!("a")]);

    let oldest: Vec<_> = store
        .query_documents(&Query::collection("todos").order_by("createdAt", Direction::Ascending))
        .unwrap()
        .into_iter()
        .map(|doc| doc.fields["text"].clone())
        .collect();
    assert_eq!(oldest, vec![json!("a"), json!("b"), json!("c")]);
}

#[test]
fn update_merges_fields_and_reports_missing_documents() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    let id = store.add_document("todos", fields("draft")).unwrap();
    let before = store.get_document("todos", &id).unwrap().unwrap();

    store
        .update_document("todos", &id, patch(json!({ "completed": true })))
        .unwrap();

    let after = store.get_document("todos", &id).unwrap().unwrap();
    assert_eq!(after.fields["text"], json!("draft"));
    assert_eq!(after.fields["completed"], json!(true));
    assert_eq!(after.fields["createdAt"], before.fields["createdAt"]);

    let err = store
        .update_document("todos", "missing", patch(json!({ "completed": true })))
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::NotFound {
            collection: "todos".to_string(),
            id: "missing".to_string(),
        }
    );
}

#[test]
fn delete_reports_whether_a_document_was_removed() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    let id = store.add_document("todos", fields("gone soon")).unwrap();

    assert!(store.delete_document("todos", &id).unwrap());
    assert!(!store.delete_document("todos", &id).unwrap());
    assert!(store.get_document("todos", &id).unwrap().is_none());
}

#[test]
fn invalid_names_are_rejected_before_touching_storage() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();

    let err = store.add_document("to dos", fields("x")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));

    let bad_order = Query::collection("todos").order_by("created.at", Direction::Ascending);
    assert!(matches!(
        store.query_documents(&bad_order),
        Err(StoreError::InvalidData(_))
    ));
    assert!(matches!(store.listen(&bad_order), Err(StoreError::InvalidData(_))));
}

#[test]
fn listen_delivers_initial_snapshot_and_every_change() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    store.add_document("todos", fields("existing")).unwrap();

    let subscription = store.listen(&newest_first()).unwrap();
    assert_eq!(texts(subscription.try_next()), vec!["existing"]);

    let id = store.add_document("todos", fields("fresh")).unwrap();
    assert_eq!(texts(subscription.try_next()), vec!["fresh", "existing"]);

    store
        .update_document("todos", &id, patch(json!({ "text": "renamed" })))
        .unwrap();
    assert_eq!(texts(subscription.try_next()), vec!["renamed", "existing"]);

    store.delete_document("todos", &id).unwrap();
    assert_eq!(texts(subscription.try_next()), vec!["existing"]);

    store.add_document("archive", fields("unrelated")).unwrap();
    assert!(subscription.try_next().is_none());
}

#[test]
fn noop_delete_does_not_notify_listeners() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    let subscription = store.listen(&newest_first()).unwrap();
    assert_eq!(texts(subscription.try_next()), Vec::<String>::new());

    store.delete_document("todos", "never-existed").unwrap();
    assert!(subscription.try_next().is_none());
}

#[test]
fn closed_subscription_stops_receiving_and_unregisters() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    let kept = store.listen(&newest_first()).unwrap();
    let closed = store.listen(&newest_first()).unwrap();
    assert_eq!(store.listeners().listener_count(), 2);

    closed.close();
    assert_eq!(store.listeners().listener_count(), 1);

    kept.try_next();
    store.add_document("todos", fields("after close")).unwrap();
    assert_eq!(
        texts(kept.next_timeout(Duration::from_millis(100))),
        vec!["after close"]
    );
}

#[test]
fn emitted_errors_reach_listeners_without_closing_them() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    let subscription = store.listen(&newest_first()).unwrap();
    subscription.try_next();

    let delivered = store
        .listeners()
        .emit_error("todos", StoreError::Transport("connection reset".to_string()));
    assert_eq!(delivered, 1);
    assert!(matches!(
        subscription.try_next(),
        Some(SnapshotEvent::Error(StoreError::Transport(_)))
    ));

    store.add_document("todos", fields("recovered")).unwrap();
    assert_eq!(texts(subscription.try_next()), vec!["recovered"]);
}

#[test]
fn file_store_persists_documents_and_keeps_clock_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.sqlite3");

    let first_ts = {
        let store = SqliteDocumentStore::open(&path).unwrap();
        let id = store.add_document("todos", fields("persisted")).unwrap();
        store.get_document("todos", &id).unwrap().unwrap().fields["createdAt"]
            .as_i64()
            .unwrap()
    };

    let reopened = SqliteDocumentStore::open(&path).unwrap();
    let id = reopened.add_document("todos", fields("later")).unwrap();
    let later_ts = reopened.get_document("todos", &id).unwrap().unwrap().fields["createdAt"]
        .as_i64()
        .unwrap();
    assert!(later_ts > first_ts);

    let texts: Vec<_> = reopened
        .query_documents(&newest_first())
        .unwrap()
        .into_iter()
        .map(|doc| doc.fields["text"].clone())
        .collect();
    assert_eq!(texts, vec![json!("later"), json!("persisted")]);
}

#[test]
fn newer_schema_version_makes_store_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version() + 1))
        .unwrap();
    drop(conn);

    let err = SqliteDocumentStore::open(&path).err().unwrap();
    assert!(matches!(err, StoreError::Unavailable(message) if message.contains("newer")));
}
