use serde_json::json;
use std::sync::Arc;
use taskboard_core::model::task::{FIELD_CREATED_AT, TASKS_COLLECTION};
use taskboard_core::store::{DocumentStore, FieldValue, SnapshotEvent, WriteFields};
use taskboard_core::{SqliteDocumentStore, StoreError, Task, TaskPatch, TaskRepository};

fn repo() -> (Arc<SqliteDocumentStore>, TaskRepository<SqliteDocumentStore>) {
    let store = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    let repo = TaskRepository::new(Arc::clone(&store));
    (store, repo)
}

fn assert_newest_first(tasks: &[Task]) {
    for pair in tasks.windows(2) {
        assert!(
            pair[0].created_at > pair[1].created_at,
            "tasks out of order: {pair:?}"
        );
    }
}

fn snapshot_ids(event: Option<SnapshotEvent>) -> Vec<String> {
    match event {
        Some(SnapshotEvent::Snapshot(documents)) => {
            documents.into_iter().map(|doc| doc.id).collect()
        }
        other => panic!("expected snapshot, got {other:?}"),
    }
}

#[test]
fn create_then_list_yields_one_open_task() {
    let (_store, repo) = repo();

    let id = repo.create("Buy milk").unwrap();
    let tasks = repo.list_all().unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, id);
    assert!(!tasks[0].id.is_empty());
    assert_eq!(tasks[0].text, "Buy milk");
    assert!(!tasks[0].completed);
}

#[test]
fn repository_stores_text_as_given() {
    let (_store, repo) = repo();

    let id = repo.create("  padded  ").unwrap();
    assert_eq!(repo.get(&id).unwrap().unwrap().text, "  padded  ");
}

#[test]
fn toggling_twice_restores_completion_and_keeps_identity() {
    let (_store, repo) = repo();
    let id = repo.create("Water plants").unwrap();
    let initial = repo.get(&id).unwrap().unwrap();

    repo.update(&id, &TaskPatch::completed(!initial.completed))
        .unwrap();
    let toggled = repo.get(&id).unwrap().unwrap();
    assert_eq!(toggled.completed, !initial.completed);

    repo.update(&id, &TaskPatch::completed(initial.completed))
        .unwrap();
    let restored = repo.get(&id).unwrap().unwrap();
    assert_eq!(restored, initial);
}

#[test]
fn editing_text_changes_nothing_else() {
    let (_store, repo) = repo();
    let id = repo.create("Draft").unwrap();
    repo.update(&id, &TaskPatch::completed(true)).unwrap();
    let before = repo.get(&id).unwrap().unwrap();

    repo.update(&id, &TaskPatch::text("Final")).unwrap();
    let after = repo.get(&id).unwrap().unwrap();

    assert_eq!(after.text, "Final");
    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.completed, before.completed);
}

#[test]
fn update_of_missing_task_is_not_found() {
    let (_store, repo) = repo();

    let err = repo
        .update("does-not-exist", &TaskPatch::completed(true))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { id, .. } if id == "does-not-exist"));
}

#[test]
fn delete_removes_task_from_lists_and_live_snapshots() {
    let (_store, repo) = repo();
    let keep = repo.create("keep").unwrap();
    let drop_id = repo.create("drop").unwrap();

    let subscription = repo.watch_all().unwrap();
    assert_eq!(
        snapshot_ids(subscription.try_next()),
        vec![drop_id.clone(), keep.clone()]
    );

    repo.delete(&drop_id).unwrap();

    let remaining: Vec<_> = repo.list_all().unwrap().into_iter().map(|t| t.id).collect();
    assert_eq!(remaining, vec![keep.clone()]);
    assert_eq!(snapshot_ids(subscription.try_next()), vec![keep.clone()]);

    repo.update(&keep, &TaskPatch::text("still here")).unwrap();
    assert_eq!(snapshot_ids(subscription.try_next()), vec![keep]);
}

#[test]
fn deleting_unknown_task_succeeds() {
    let (_store, repo) = repo();
    repo.create("unrelated").unwrap();

    repo.delete("never-created").unwrap();
    assert_eq!(repo.list_all().unwrap().len(), 1);
}

#[test]
fn list_stays_newest_first_across_mixed_operations() {
    let (_store, repo) = repo();
    let mut ids = Vec::new();
    for index in 0..8 {
        ids.push(repo.create(&format!("task {index}")).unwrap());
        assert_newest_first(&repo.list_all().unwrap());
    }

    repo.update(&ids[0], &TaskPatch::text("oldest, edited")).unwrap();
    repo.update(&ids[3], &TaskPatch::completed(true)).unwrap();
    repo.delete(&ids[5]).unwrap();
    ids.push(repo.create("newest").unwrap());
    repo.delete(&ids[1]).unwrap();

    let tasks = repo.list_all().unwrap();
    assert_newest_first(&tasks);
    assert_eq!(tasks.len(), 7);
    assert_eq!(tasks[0].text, "newest");
    assert_eq!(tasks.last().unwrap().text, "oldest, edited");
}

#[test]
fn unavailable_repository_fails_every_operation() {
    let repo = TaskRepository::<SqliteDocumentStore>::unavailable("missing configuration");
    assert!(!repo.is_available());

    let expect_unavailable = |err: StoreError| {
        assert_eq!(
            err,
            StoreError::Unavailable("missing configuration".to_string())
        );
    };
    expect_unavailable(repo.create("x").unwrap_err());
    expect_unavailable(repo.list_all().unwrap_err());
    expect_unavailable(repo.get("x").unwrap_err());
    expect_unavailable(repo.update("x", &TaskPatch::completed(true)).unwrap_err());
    expect_unavailable(repo.delete("x").unwrap_err());
    expect_unavailable(repo.watch_all().err().unwrap());
}

#[test]
fn malformed_documents_are_rejected_on_read() {
    let (store, repo) = repo();
    repo.create("valid").unwrap();
    store
        .add_document(
            TASKS_COLLECTION,
            WriteFields::from([
                ("text".to_string(), FieldValue::from(json!(7))),
                (FIELD_CREATED_AT.to_string(), FieldValue::ServerTimestamp),
            ]),
        )
        .unwrap();

    let err = repo.list_all().unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
}
