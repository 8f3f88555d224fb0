mod common;

use common::*;
use room_search_service::config::IndexNames;
use room_search_service::services::search_engine::SearchError;
use room_search_service::services::{BootstrapError, Bootstrapper};
use serde_json::json;
use std::sync::Arc;

fn store() -> Arc<InMemoryRoomStore> {
    let store = Arc::new(InMemoryRoomStore::new());
    store.add_room("!r1:x", Some("Skywalkers"));
    store.add_room("!r2:x", Some("Rebels"));
    store.add_room("!dm:x", None);
    store.add_room("!secret:x", Some("Secret plans"));
    store.encrypt_room("!secret:x");

    store.join("!r1:x", "@a:x", "Anakin Skywalker");
    store.join("!r2:x", "@l:x", "Luke");

    store.add_message("!r1:x", "$e1", "@a:x", "Hello Anakin");
    store.add_message("!r2:x", "$e2", "@l:x", "Red five standing by");
    store.add_message("!r2:x", "$e3", "@l:x", "Almost there");
    store.add_message("!secret:x", "$e4", "@a:x", "Order 66");
    store
}

#[tokio::test]
async fn bootstrap_creates_indices_and_backfills_clear_rooms() {
    let engine = Arc::new(InMemorySearchEngine::new());
    let store = store();
    let bootstrapper = Bootstrapper::new(engine.clone(), store.clone(), IndexNames::default(), 2);

    let report = bootstrapper.run().await.unwrap();

    assert_eq!(report.created_indices, vec![ROOMS.to_string(), MESSAGES.to_string()]);
    assert_eq!(report.rooms_backfilled, 2);
    assert_eq!(report.messages_backfilled, 3);

    assert_eq!(engine.ids(ROOMS), vec!["!r1:x".to_string(), "!r2:x".to_string()]);
    assert!(engine.get(MESSAGES, "$e4").is_none());
    assert_eq!(
        engine.get(MESSAGES, "$e1").unwrap()["display_name"],
        "Anakin Skywalker"
    );

    // One rooms batch, two messages batches of at most two documents.
    assert_eq!(engine.bulk_calls(), 3);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let engine = Arc::new(InMemorySearchEngine::new());
    let store = store();
    let bootstrapper = Bootstrapper::new(engine.clone(), store.clone(), IndexNames::default(), 500);

    bootstrapper.run().await.unwrap();
    let calls = engine.bulk_calls();

    let report = bootstrapper.run().await.unwrap();

    assert!(report.created_indices.is_empty());
    assert_eq!(report.rooms_backfilled, 0);
    assert_eq!(report.messages_backfilled, 0);
    assert_eq!(engine.bulk_calls(), calls);
    assert_eq!(engine.ids(MESSAGES).len(), 3);
}

#[tokio::test]
async fn existing_index_is_kept_even_when_documents_are_missing() {
    let engine = Arc::new(InMemorySearchEngine::with_indices(&[ROOMS, MESSAGES]));
    let store = store();
    let bootstrapper = Bootstrapper::new(engine.clone(), store.clone(), IndexNames::default(), 500);

    let report = bootstrapper.run().await.unwrap();

    assert!(report.created_indices.is_empty());
    assert!(engine.ids(ROOMS).is_empty());
}

#[tokio::test]
async fn preseeded_duplicate_fails_loudly() {
    let engine = Arc::new(InMemorySearchEngine::new());
    engine.preseed_on_create(MESSAGES, "$e2", json!({ "id": "$e2", "content": "stale" }));
    let store = store();
    let bootstrapper = Bootstrapper::new(engine.clone(), store.clone(), IndexNames::default(), 500);

    let err = bootstrapper.run().await.unwrap_err();

    match err {
        BootstrapError::Search(SearchError::BulkFailure { failures }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].index, MESSAGES);
            assert_eq!(failures[0].id, "$e2");
            assert_eq!(failures[0].status, 409);
        }
        other => panic!("expected bulk failure, got {other:?}"),
    }

    // The duplicate was not overwritten.
    assert_eq!(engine.get(MESSAGES, "$e2").unwrap()["content"], "stale");
}

#[tokio::test]
async fn rejected_document_does_not_stop_later_batches() {
    let engine = Arc::new(InMemorySearchEngine::new());
    engine.preseed_on_create(MESSAGES, "$e1", json!({ "id": "$e1", "content": "stale" }));
    let store = store();
    let bootstrapper = Bootstrapper::new(engine.clone(), store.clone(), IndexNames::default(), 1);

    let err = bootstrapper.run().await.unwrap_err();

    // $e1 is alone in the first batch; the following batches are still sent.
    assert_eq!(engine.bulk_calls(), 5);
    assert_eq!(engine.get(MESSAGES, "$e2").unwrap()["content"], "Red five standing by");
    assert_eq!(engine.get(MESSAGES, "$e3").unwrap()["content"], "Almost there");
    match err {
        BootstrapError::Search(SearchError::BulkFailure { failures }) => {
            let ids: Vec<&str> = failures.iter().map(|f| f.id.as_str()).collect();
            assert_eq!(ids, vec!["$e1"]);
        }
        other => panic!("expected bulk failure, got {other:?}"),
    }
}

#[tokio::test]
async fn failures_from_every_batch_are_reported_together() {
    let engine = Arc::new(InMemorySearchEngine::new());
    engine.preseed_on_create(MESSAGES, "$e1", json!({ "id": "$e1", "content": "stale" }));
    engine.preseed_on_create(MESSAGES, "$e3", json!({ "id": "$e3", "content": "stale" }));
    let store = store();
    let bootstrapper = Bootstrapper::new(engine.clone(), store.clone(), IndexNames::default(), 2);

    let err = bootstrapper.run().await.unwrap_err();

    match err {
        BootstrapError::Search(SearchError::BulkFailure { failures }) => {
            let ids: Vec<&str> = failures.iter().map(|f| f.id.as_str()).collect();
            assert_eq!(ids, vec!["$e1", "$e3"]);
        }
        other => panic!("expected bulk failure, got {other:?}"),
    }
    assert!(engine.get(MESSAGES, "$e2").is_some());
}

#[tokio::test]
async fn engine_failure_surfaces_as_error() {
    let engine = Arc::new(InMemorySearchEngine::new());
    engine.fail_all();
    let bootstrapper = Bootstrapper::new(engine, store(), IndexNames::default(), 500);

    let err = bootstrapper.run().await.unwrap_err();
    assert!(matches!(err, BootstrapError::Search(SearchError::Engine { status: 500, .. })));
}
