//! Read, revoke, and destroy flows through the action layer.

mod common;

use cachet_server::actions::{self, ActionOutcome};
use cachet_server::models::MessageStatus;
use common::{new_message, TestEnv};

#[tokio::test]
async fn mark_read_sets_all_three_fields_exactly_once() {
    let env = TestEnv::new();
    let mut message = new_message("m1", "alice", "bob");
    message.status = MessageStatus::Delivered;
    env.store.insert(message);

    let mut alice_events = env.events.subscribe("alice").await;

    let outcome = actions::mark_read(env.store.as_ref(), &env.events, "m1", "bob")
        .await
        .unwrap();
    let ActionOutcome::Updated(read) = outcome else {
        panic!("expected Updated, got {outcome:?}");
    };
    assert!(read.is_read);
    assert!(read.read_at.is_some());
    assert_eq!(read.status, MessageStatus::Read);

    // The sender receives a read receipt, not an anchoring update.
    let event = alice_events.try_recv().unwrap();
    assert_eq!(event.action, "read");
    assert_eq!(event.data["reader_id"], "bob");

    // Second call: no-op, read_at keeps its original value.
    let outcome = actions::mark_read(env.store.as_ref(), &env.events, "m1", "bob")
        .await
        .unwrap();
    let ActionOutcome::Unchanged(unchanged) = outcome else {
        panic!("expected Unchanged, got {outcome:?}");
    };
    assert_eq!(unchanged.read_at, read.read_at);
    assert!(alice_events.try_recv().is_err());
}

#[tokio::test]
async fn pending_message_cannot_be_read_before_delivery() {
    let env = TestEnv::new();
    env.store.insert(new_message("m1", "alice", "bob"));

    // Reading before anchoring completes must leave the row pending, or a
    // confirmed commitment could never be recorded against it.
    let outcome = actions::mark_read(env.store.as_ref(), &env.events, "m1", "bob")
        .await
        .unwrap();
    assert!(matches!(outcome, ActionOutcome::Unchanged(_)));
    let row = env.store.get_sync("m1").unwrap();
    assert!(!row.is_read);
    assert_eq!(row.status, MessageStatus::Pending);

    // Anchoring still claims the row and persists the commitment.
    env.pipeline().run("m1").await.unwrap();
    let anchored = env.store.get_sync("m1").unwrap();
    assert!(anchored.ledger_commitment.is_some());
    assert_eq!(anchored.status, MessageStatus::Delivered);

    let outcome = actions::mark_read(env.store.as_ref(), &env.events, "m1", "bob")
        .await
        .unwrap();
    assert!(matches!(outcome, ActionOutcome::Updated(_)));
}

#[tokio::test]
async fn only_the_recipient_can_mark_read() {
    let env = TestEnv::new();
    env.store.insert(new_message("m1", "alice", "bob"));

    let outcome = actions::mark_read(env.store.as_ref(), &env.events, "m1", "alice")
        .await
        .unwrap();
    assert!(matches!(outcome, ActionOutcome::Forbidden));
    assert!(!env.store.get_sync("m1").unwrap().is_read);
}

#[tokio::test]
async fn revoke_before_anchoring_touches_no_external_store() {
    let env = TestEnv::new();
    env.store.insert(new_message("m1", "alice", "bob"));

    let outcome = actions::revoke(
        env.store.as_ref(),
        env.blobs.as_ref(),
        env.ledger.as_ref(),
        env.index.as_ref(),
        &env.events,
        "m1",
        "alice",
    )
    .await
    .unwrap();

    let ActionOutcome::Updated(revoked) = outcome else {
        panic!("expected Updated, got {outcome:?}");
    };
    assert_eq!(revoked.status, MessageStatus::Revoked);
    assert!(env.blobs.unpinned().is_empty());
    assert!(env.ledger.revoked().is_empty());
    // The row itself is kept as a tombstone.
    assert!(env.store.contains("m1"));
}

#[tokio::test]
async fn revoke_after_anchoring_releases_the_footprint() {
    let env = TestEnv::new();
    env.store.insert(new_message("m1", "alice", "bob"));
    env.pipeline().run("m1").await.unwrap();

    let anchored = env.store.get_sync("m1").unwrap();
    let address = anchored.blob_address.clone().unwrap();
    let commitment = anchored.ledger_commitment.clone().unwrap();

    let outcome = actions::revoke(
        env.store.as_ref(),
        env.blobs.as_ref(),
        env.ledger.as_ref(),
        env.index.as_ref(),
        &env.events,
        "m1",
        "alice",
    )
    .await
    .unwrap();

    assert!(matches!(outcome, ActionOutcome::Updated(_)));
    assert_eq!(env.blobs.unpinned(), [address]);
    assert_eq!(env.ledger.revoked(), [commitment]);
    assert!(env
        .index
        .statuses()
        .contains(&("m1".to_string(), "revoked".to_string())));
    assert!(env.store.contains("m1"));
}

#[tokio::test]
async fn only_the_sender_can_revoke() {
    let env = TestEnv::new();
    env.store.insert(new_message("m1", "alice", "bob"));

    let outcome = actions::revoke(
        env.store.as_ref(),
        env.blobs.as_ref(),
        env.ledger.as_ref(),
        env.index.as_ref(),
        &env.events,
        "m1",
        "bob",
    )
    .await
    .unwrap();
    assert!(matches!(outcome, ActionOutcome::Forbidden));
    assert_eq!(
        env.store.get_sync("m1").unwrap().status,
        MessageStatus::Pending
    );
}

#[tokio::test]
async fn actions_on_terminal_messages_are_no_ops() {
    let env = TestEnv::new();
    let mut message = new_message("m1", "alice", "bob");
    message.status = MessageStatus::Revoked;
    env.store.insert(message.clone());

    let outcome = actions::mark_read(env.store.as_ref(), &env.events, "m1", "bob")
        .await
        .unwrap();
    assert!(matches!(outcome, ActionOutcome::Unchanged(_)));

    let outcome = actions::revoke(
        env.store.as_ref(),
        env.blobs.as_ref(),
        env.ledger.as_ref(),
        env.index.as_ref(),
        &env.events,
        "m1",
        "alice",
    )
    .await
    .unwrap();
    assert!(matches!(outcome, ActionOutcome::Unchanged(_)));

    let current = env.store.get_sync("m1").unwrap();
    assert_eq!(current.status, MessageStatus::Revoked);
    assert!(!current.is_read);
    assert!(env.blobs.unpinned().is_empty());
    assert!(env.ledger.revoked().is_empty());
}

#[tokio::test]
async fn destroy_releases_anchors_then_deletes_the_row() {
    let env = TestEnv::new();
    env.store.insert(new_message("m1", "alice", "bob"));
    env.pipeline().run("m1").await.unwrap();
    let commitment = env
        .store
        .get_sync("m1")
        .unwrap()
        .ledger_commitment
        .unwrap();

    let outcome = actions::destroy(
        env.store.as_ref(),
        env.blobs.as_ref(),
        env.ledger.as_ref(),
        env.index.as_ref(),
        "m1",
        "alice",
    )
    .await
    .unwrap();

    assert!(matches!(outcome, ActionOutcome::Deleted));
    assert!(!env.store.contains("m1"));
    assert_eq!(env.ledger.revoked(), [commitment]);
    assert_eq!(env.blobs.unpinned().len(), 1);
}

#[tokio::test]
async fn destroy_is_sender_only() {
    let env = TestEnv::new();
    env.store.insert(new_message("m1", "alice", "bob"));

    let outcome = actions::destroy(
        env.store.as_ref(),
        env.blobs.as_ref(),
        env.ledger.as_ref(),
        env.index.as_ref(),
        "m1",
        "bob",
    )
    .await
    .unwrap();
    assert!(matches!(outcome, ActionOutcome::Forbidden));
    assert!(env.store.contains("m1"));
}

#[tokio::test]
async fn missing_message_reports_not_found() {
    let env = TestEnv::new();
    let outcome = actions::mark_read(env.store.as_ref(), &env.events, "nope", "bob")
        .await
        .unwrap();
    assert!(matches!(outcome, ActionOutcome::NotFound));
}
