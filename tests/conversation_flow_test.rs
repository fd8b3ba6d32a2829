mod common;

use chrono::{Duration, Utc};
use uuid::Uuid;

use realtime_messaging_service::error::NOT_FOUND_OR_FORBIDDEN;
use realtime_messaging_service::models::conversation::ConversationStatus;
use realtime_messaging_service::services::ConversationService;
use realtime_messaging_service::websocket::ConnectionRegistry;

use common::{create_user, insert_message, mark_read, setup_pool};

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn initiate_is_idempotent_across_argument_order() {
    let pool = setup_pool().await;
    let alice = create_user(&pool, "Alice").await;
    let bob = create_user(&pool, "Bob").await;

    let (first, _) = ConversationService::initiate_conversation(&pool, alice, bob)
        .await
        .unwrap();
    let (second, _) = ConversationService::initiate_conversation(&pool, bob, alice)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM conversations
        WHERE (initiator_id = $1 AND receiver_id = $2)
           OR (initiator_id = $2 AND receiver_id = $1)
        "#,
    )
    .bind(alice)
    .bind(bob)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn initiate_with_unknown_target_fails() {
    let pool = setup_pool().await;
    let alice = create_user(&pool, "Alice").await;

    let err = ConversationService::initiate_conversation(&pool, alice, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "User not found");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn initiate_with_self_is_rejected() {
    let pool = setup_pool().await;
    let alice = create_user(&pool, "Alice").await;

    let err = ConversationService::initiate_conversation(&pool, alice, alice)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn missing_and_foreign_conversations_fail_identically() {
    let pool = setup_pool().await;
    let alice = create_user(&pool, "Alice").await;
    let bob = create_user(&pool, "Bob").await;
    let outsider = create_user(&pool, "Mallory").await;

    let (conversation, _) = ConversationService::initiate_conversation(&pool, alice, bob)
        .await
        .unwrap();

    let foreign_err =
        ConversationService::load_conversation(&pool, outsider, conversation.id, None, None)
            .await
            .unwrap_err();
    let missing_err =
        ConversationService::load_conversation(&pool, outsider, Uuid::new_v4(), None, None)
            .await
            .unwrap_err();

    assert_eq!(foreign_err.to_string(), NOT_FOUND_OR_FORBIDDEN);
    assert_eq!(foreign_err.to_string(), missing_err.to_string());
    assert_eq!(foreign_err.status_code(), missing_err.status_code());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn status_transitions_are_unrestricted() {
    let pool = setup_pool().await;
    let alice = create_user(&pool, "Alice").await;
    let bob = create_user(&pool, "Bob").await;
    let (conversation, _) = ConversationService::initiate_conversation(&pool, alice, bob)
        .await
        .unwrap();

    let (archived, _) = ConversationService::archive_conversation(&pool, alice, conversation.id)
        .await
        .unwrap();
    assert_eq!(archived.status, ConversationStatus::Archived);

    // Blocking straight from archived, no intermediate state required.
    let (blocked, _) = ConversationService::block_conversation(&pool, bob, conversation.id)
        .await
        .unwrap();
    assert_eq!(blocked.status, ConversationStatus::Blocked);

    let (active, _) = ConversationService::unblock_conversation(&pool, alice, conversation.id)
        .await
        .unwrap();
    assert_eq!(active.status, ConversationStatus::Active);

    // Re-applying the current status is a successful no-op.
    let (still_active, _) = ConversationService::unblock_conversation(&pool, alice, conversation.id)
        .await
        .unwrap();
    assert_eq!(still_active.status, ConversationStatus::Active);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn initiate_pushes_reach_both_participants_with_per_viewer_payloads() {
    let pool = setup_pool().await;
    let registry = ConnectionRegistry::new();
    let alice = create_user(&pool, "Alice").await;
    let bob = create_user(&pool, "Bob").await;

    let (_ida, mut rx_alice) = registry.register(alice);
    let (_idb, mut rx_bob) = registry.register(bob);

    let (_, pushes) = ConversationService::initiate_conversation(&pool, alice, bob)
        .await
        .unwrap();
    registry.execute(&pushes);

    let alice_frame: serde_json::Value =
        serde_json::from_str(&rx_alice.try_recv().unwrap()).unwrap();
    let bob_frame: serde_json::Value = serde_json::from_str(&rx_bob.try_recv().unwrap()).unwrap();

    assert_eq!(alice_frame["type"], "conversation_update");
    assert_eq!(bob_frame["type"], "conversation_update");
    // Each side sees the other as the counterpart.
    assert_eq!(alice_frame["data"]["counterpart"]["id"], bob.to_string());
    assert_eq!(bob_frame["data"]["counterpart"]["id"], alice.to_string());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn block_notifies_counterpart_with_action_tag_but_archive_does_not() {
    let pool = setup_pool().await;
    let registry = ConnectionRegistry::new();
    let alice = create_user(&pool, "Alice").await;
    let bob = create_user(&pool, "Bob").await;
    let (conversation, _) = ConversationService::initiate_conversation(&pool, alice, bob)
        .await
        .unwrap();

    let (_id, mut rx_bob) = registry.register(bob);

    let (_, pushes) = ConversationService::block_conversation(&pool, alice, conversation.id)
        .await
        .unwrap();
    registry.execute(&pushes);
    let frame: serde_json::Value = serde_json::from_str(&rx_bob.try_recv().unwrap()).unwrap();
    assert_eq!(frame["data"]["action"], "blocked");

    let (_, pushes) = ConversationService::archive_conversation(&pool, alice, conversation.id)
        .await
        .unwrap();
    registry.execute(&pushes);
    let frame: serde_json::Value = serde_json::from_str(&rx_bob.try_recv().unwrap()).unwrap();
    assert!(frame["data"].get("action").is_none());
    assert_eq!(frame["data"]["id"], conversation.id.to_string());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn delete_removes_row_and_notifies_both_sides() {
    let pool = setup_pool().await;
    let registry = ConnectionRegistry::new();
    let alice = create_user(&pool, "Alice").await;
    let bob = create_user(&pool, "Bob").await;
    let (conversation, _) = ConversationService::initiate_conversation(&pool, alice, bob)
        .await
        .unwrap();

    let (_ida, mut rx_alice) = registry.register(alice);
    let (_idb, mut rx_bob) = registry.register(bob);

    let (_, pushes) = ConversationService::delete_conversation(&pool, alice, conversation.id)
        .await
        .unwrap();
    registry.execute(&pushes);

    for rx in [&mut rx_alice, &mut rx_bob] {
        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["data"]["action"], "deleted");
        assert_eq!(
            frame["data"]["conversation_id"],
            conversation.id.to_string()
        );
    }

    let err = ConversationService::load_conversation(&pool, alice, conversation.id, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), NOT_FOUND_OR_FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn unread_count_reflects_receipts_and_ignores_own_messages() {
    let pool = setup_pool().await;
    let alice = create_user(&pool, "Alice").await;
    let bob = create_user(&pool, "Bob").await;
    let (conversation, _) = ConversationService::initiate_conversation(&pool, alice, bob)
        .await
        .unwrap();

    let base = Utc::now();
    let m1 = insert_message(&pool, conversation.id, bob, "one", base).await;
    insert_message(&pool, conversation.id, bob, "two", base + Duration::seconds(1)).await;
    // Alice's own message never counts against her.
    insert_message(&pool, conversation.id, alice, "reply", base + Duration::seconds(2)).await;

    let (listing, _) = ConversationService::list_conversations(&pool, alice, None, None, None)
        .await
        .unwrap();
    assert_eq!(listing.conversations.len(), 1);
    assert_eq!(listing.conversations[0].unread_count, 2);

    mark_read(&pool, m1, alice).await;
    let (listing, _) = ConversationService::list_conversations(&pool, alice, None, None, None)
        .await
        .unwrap();
    assert_eq!(listing.conversations[0].unread_count, 1);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn list_search_matches_counterpart_name_and_last_message() {
    let pool = setup_pool().await;
    let alice = create_user(&pool, "Alice").await;
    let bartholomew = create_user(&pool, "Bartholomew").await;
    let carol = create_user(&pool, "Carol").await;

    let (with_bart, _) = ConversationService::initiate_conversation(&pool, alice, bartholomew)
        .await
        .unwrap();
    let (with_carol, _) = ConversationService::initiate_conversation(&pool, alice, carol)
        .await
        .unwrap();
    insert_message(&pool, with_carol.id, carol, "meet at the harbor", Utc::now()).await;

    let (by_name, _) = ConversationService::list_conversations(
        &pool,
        alice,
        None,
        None,
        Some("tholo".to_string()),
    )
    .await
    .unwrap();
    assert_eq!(by_name.conversations.len(), 1);
    assert_eq!(by_name.conversations[0].summary.id, with_bart.id);

    let (by_content, _) = ConversationService::list_conversations(
        &pool,
        alice,
        None,
        None,
        Some("HARBOR".to_string()),
    )
    .await
    .unwrap();
    assert_eq!(by_content.conversations.len(), 1);
    assert_eq!(by_content.conversations[0].summary.id, with_carol.id);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn load_pages_read_chronologically_within_each_page() {
    let pool = setup_pool().await;
    let alice = create_user(&pool, "Alice").await;
    let bob = create_user(&pool, "Bob").await;
    let (conversation, _) = ConversationService::initiate_conversation(&pool, alice, bob)
        .await
        .unwrap();

    let base = Utc::now();
    for i in 0..5 {
        insert_message(
            &pool,
            conversation.id,
            bob,
            &format!("message {i}"),
            base + Duration::seconds(i),
        )
        .await;
    }

    // Page 1 holds the two most recent messages, oldest of the pair first.
    let (detail, _) =
        ConversationService::load_conversation(&pool, alice, conversation.id, Some(1), Some(2))
            .await
            .unwrap();
    assert_eq!(detail.messages.len(), 2);
    assert_eq!(detail.messages[0].content, "message 3");
    assert_eq!(detail.messages[1].content, "message 4");
    assert_eq!(detail.pagination.total, 5);
    assert_eq!(detail.pagination.total_pages, 3);

    let (detail, _) =
        ConversationService::load_conversation(&pool, alice, conversation.id, Some(3), Some(2))
            .await
            .unwrap();
    assert_eq!(detail.messages.len(), 1);
    assert_eq!(detail.messages[0].content, "message 0");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn list_orders_by_most_recent_activity() {
    let pool = setup_pool().await;
    let alice = create_user(&pool, "Alice").await;
    let bob = create_user(&pool, "Bob").await;
    let carol = create_user(&pool, "Carol").await;

    let (with_bob, _) = ConversationService::initiate_conversation(&pool, alice, bob)
        .await
        .unwrap();
    let (with_carol, _) = ConversationService::initiate_conversation(&pool, alice, carol)
        .await
        .unwrap();

    // Activity in the older conversation bumps it to the top.
    insert_message(&pool, with_bob.id, bob, "ping", Utc::now() + Duration::seconds(5)).await;

    let (listing, _) = ConversationService::list_conversations(&pool, alice, None, None, None)
        .await
        .unwrap();
    assert_eq!(listing.conversations[0].summary.id, with_bob.id);
    assert_eq!(listing.conversations[1].summary.id, with_carol.id);
    assert_eq!(
        listing.conversations[0].last_message.as_ref().unwrap().content,
        "ping"
    );
}
