//! Database-backed flow tests. They need a reachable Postgres named by
//! DATABASE_URL and are marked #[ignore]; run them with
//! `cargo test -- --ignored`.

mod common;

use uuid::Uuid;

use chat_service::error::AppError;
use chat_service::models::conversation::ConversationKind;
use chat_service::models::message::{MessageKind, MessageStatus, DELETED_TOMBSTONE};
use chat_service::models::offer::OfferStatus;
use chat_service::routes::messages::{CreateMessageRequest, OfferPayload};
use chat_service::services::conversation_service::{
    ConversationService, CreateConversationInput,
};
use chat_service::services::message_service::MessageService;
use chat_service::services::offer_service::OfferService;
use chat_service::services::participant_service::ParticipantService;
use chat_service::services::user_directory::{PgUserDirectory, UserRole};

fn direct_input(other: Uuid) -> CreateConversationInput {
    CreateConversationInput {
        kind: ConversationKind::Direct,
        participant_ids: vec![other],
        name: None,
        description: None,
        is_private: false,
        max_participants: None,
    }
}

fn text_message(conversation_id: Uuid, content: &str) -> CreateMessageRequest {
    CreateMessageRequest {
        conversation_id,
        content: content.to_string(),
        kind: MessageKind::Text,
        reply_to_id: None,
        file_id: None,
        offer: None,
    }
}

fn offer_payload(child_name: &str) -> OfferPayload {
    OfferPayload {
        child_name: child_name.to_string(),
        amount_monthly: 2500,
        subject: "Mathematics".to_string(),
        start_date: chrono::NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
        start_time: "16:00".to_string(),
        end_time: "17:00".to_string(),
        days_of_week: vec!["mon".to_string(), "wed".to_string()],
        description: None,
    }
}

#[tokio::test]
#[ignore]
async fn direct_conversation_create_is_idempotent() {
    let db = common::test_db().await;
    let users = PgUserDirectory::new(db.clone());
    let tutor = common::create_user(&db, "Tutor A", UserRole::Tutor).await;
    let parent = common::create_user(&db, "Parent A", UserRole::Parent).await;

    let first = ConversationService::create_conversation(&db, &users, tutor, direct_input(parent))
        .await
        .unwrap();
    // Same pair, opposite creator: must resolve to the same conversation.
    let second = ConversationService::create_conversation(&db, &users, parent, direct_input(tutor))
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
#[ignore]
async fn unknown_participant_is_rejected() {
    let db = common::test_db().await;
    let users = PgUserDirectory::new(db.clone());
    let tutor = common::create_user(&db, "Tutor B", UserRole::Tutor).await;

    let result =
        ConversationService::create_conversation(&db, &users, tutor, direct_input(Uuid::new_v4()))
            .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
#[ignore]
async fn send_read_and_unread_counting() {
    let db = common::test_db().await;
    let users = PgUserDirectory::new(db.clone());
    let tutor = common::create_user(&db, "Tutor C", UserRole::Tutor).await;
    let parent = common::create_user(&db, "Parent C", UserRole::Parent).await;
    let conversation =
        ConversationService::create_conversation(&db, &users, tutor, direct_input(parent))
            .await
            .unwrap();

    let message =
        MessageService::create_message(&db, &users, tutor, UserRole::Tutor, &text_message(conversation, "hello"))
            .await
            .unwrap();
    assert_eq!(message.content, "hello");
    assert_eq!(message.status, MessageStatus::Sent);

    assert_eq!(
        MessageService::unread_count(&db, conversation, parent)
            .await
            .unwrap(),
        1
    );
    // The sender's own messages never count as unread.
    assert_eq!(
        MessageService::unread_count(&db, conversation, tutor)
            .await
            .unwrap(),
        0
    );

    let first_cursor = ConversationService::mark_as_read(&db, conversation, parent)
        .await
        .unwrap();
    assert_eq!(
        MessageService::unread_count(&db, conversation, parent)
            .await
            .unwrap(),
        0
    );
    // The other sender's message transitions to READ.
    let read_back = MessageService::load_message(&db, message.id).await.unwrap();
    assert_eq!(read_back.status, MessageStatus::Read);

    // The reader's own messages are untouched by their own mark-as-read.
    let reply = MessageService::create_message(
        &db,
        &users,
        parent,
        UserRole::Parent,
        &text_message(conversation, "hi there"),
    )
    .await
    .unwrap();
    ConversationService::mark_as_read(&db, conversation, parent)
        .await
        .unwrap();
    let own_back = MessageService::load_message(&db, reply.id).await.unwrap();
    assert_eq!(own_back.status, MessageStatus::Sent);

    // Idempotent: a repeat read never moves the cursor backward.
    let second_cursor = ConversationService::mark_as_read(&db, conversation, parent)
        .await
        .unwrap();
    assert!(second_cursor >= first_cursor);

    // Non-participants cannot mark a conversation read.
    let outsider = common::create_user(&db, "Outsider C", UserRole::Parent).await;
    let result = ConversationService::mark_as_read(&db, conversation, outsider).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
#[ignore]
async fn read_cursor_never_moves_backward() {
    let db = common::test_db().await;
    let users = PgUserDirectory::new(db.clone());
    let tutor = common::create_user(&db, "Tutor H", UserRole::Tutor).await;
    let parent = common::create_user(&db, "Parent H", UserRole::Parent).await;
    let conversation =
        ConversationService::create_conversation(&db, &users, tutor, direct_input(parent))
            .await
            .unwrap();

    let now = chrono::Utc::now();
    let first = ParticipantService::update_read_cursor(&db, conversation, parent, now)
        .await
        .unwrap();

    // An older timestamp leaves the cursor where it is.
    let earlier = now - chrono::Duration::minutes(5);
    let second = ParticipantService::update_read_cursor(&db, conversation, parent, earlier)
        .await
        .unwrap();
    assert_eq!(second, first);
    assert!(second > earlier);

    // Non-members have no cursor to advance.
    let outsider = common::create_user(&db, "Outsider H", UserRole::Parent).await;
    let result = ParticipantService::update_read_cursor(&db, conversation, outsider, now).await;
    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
#[ignore]
async fn deleted_message_renders_as_tombstone() {
    let db = common::test_db().await;
    let users = PgUserDirectory::new(db.clone());
    let tutor = common::create_user(&db, "Tutor D", UserRole::Tutor).await;
    let parent = common::create_user(&db, "Parent D", UserRole::Parent).await;
    let conversation =
        ConversationService::create_conversation(&db, &users, tutor, direct_input(parent))
            .await
            .unwrap();

    let message =
        MessageService::create_message(&db, &users, tutor, UserRole::Tutor, &text_message(conversation, "oops"))
            .await
            .unwrap();

    // Only the sender may delete.
    let result = MessageService::soft_delete_message(&db, message.id, parent).await;
    assert!(matches!(result, Err(AppError::Forbidden)));

    MessageService::soft_delete_message(&db, message.id, tutor)
        .await
        .unwrap();
    // Repeat delete is a no-op.
    MessageService::soft_delete_message(&db, message.id, tutor)
        .await
        .unwrap();

    let page = MessageService::get_messages(&db, conversation, parent, 1, 20)
        .await
        .unwrap();
    let row = page
        .messages
        .iter()
        .find(|m| m.id == message.id)
        .expect("tombstoned message stays in history");
    assert_eq!(row.content, DELETED_TOMBSTONE);

    // Deleted messages no longer count as unread.
    assert_eq!(
        MessageService::unread_count(&db, conversation, parent)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
#[ignore]
async fn reply_must_stay_in_the_same_conversation() {
    let db = common::test_db().await;
    let users = PgUserDirectory::new(db.clone());
    let tutor = common::create_user(&db, "Tutor E", UserRole::Tutor).await;
    let parent_a = common::create_user(&db, "Parent E1", UserRole::Parent).await;
    let parent_b = common::create_user(&db, "Parent E2", UserRole::Parent).await;

    let conv_a = ConversationService::create_conversation(&db, &users, tutor, direct_input(parent_a))
        .await
        .unwrap();
    let conv_b = ConversationService::create_conversation(&db, &users, tutor, direct_input(parent_b))
        .await
        .unwrap();

    let original =
        MessageService::create_message(&db, &users, tutor, UserRole::Tutor, &text_message(conv_a, "hi"))
            .await
            .unwrap();

    let mut cross_reply = text_message(conv_b, "re: hi");
    cross_reply.reply_to_id = Some(original.id);
    let result =
        MessageService::create_message(&db, &users, tutor, UserRole::Tutor, &cross_reply).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    // The rejected send leaves nothing behind.
    let page = MessageService::get_messages(&db, conv_b, tutor, 1, 20)
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
#[ignore]
async fn offer_lifecycle_and_accept_conflict() {
    let db = common::test_db().await;
    let users = PgUserDirectory::new(db.clone());
    let tutor = common::create_user(&db, "Tutor F", UserRole::Tutor).await;
    let parent = common::create_user(&db, "Parent F", UserRole::Parent).await;
    common::create_child(&db, parent, "Lena").await;
    let conversation =
        ConversationService::create_conversation(&db, &users, tutor, direct_input(parent))
            .await
            .unwrap();

    let offer_request = CreateMessageRequest {
        conversation_id: conversation,
        content: String::new(),
        kind: MessageKind::Offer,
        reply_to_id: None,
        file_id: None,
        offer: Some(offer_payload("Lena")),
    };

    // Parents cannot send offers.
    let result =
        MessageService::create_message(&db, &users, parent, UserRole::Parent, &offer_request).await;
    assert!(matches!(result, Err(AppError::Forbidden)));

    // Unknown child is rejected.
    let mut bad_child = offer_request.clone();
    bad_child.offer = Some(offer_payload("Nobody"));
    let result =
        MessageService::create_message(&db, &users, tutor, UserRole::Tutor, &bad_child).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let first =
        MessageService::create_message(&db, &users, tutor, UserRole::Tutor, &offer_request)
            .await
            .unwrap();
    let first_offer = first.offer.expect("offer embedded in the message");
    assert_eq!(first_offer.status, OfferStatus::Pending);

    // A second PENDING offer for the same child is allowed.
    let second =
        MessageService::create_message(&db, &users, tutor, UserRole::Tutor, &offer_request)
            .await
            .unwrap();
    let second_offer = second.offer.unwrap();

    // Only the receiver may respond.
    let result = OfferService::respond(&db, first_offer.id, tutor, OfferStatus::Accepted).await;
    assert!(matches!(result, Err(AppError::Forbidden)));

    let (accepted, system_message_id) =
        OfferService::respond(&db, first_offer.id, parent, OfferStatus::Accepted)
            .await
            .unwrap();
    assert_eq!(accepted.status, OfferStatus::Accepted);
    let system_message = MessageService::load_message(&db, system_message_id)
        .await
        .unwrap();
    assert_eq!(system_message.kind, MessageKind::System);

    // Terminal offers never re-transition.
    let result = OfferService::respond(&db, first_offer.id, parent, OfferStatus::Rejected).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    // A second accept for the same child collides with the unique index.
    let result = OfferService::respond(&db, second_offer.id, parent, OfferStatus::Accepted).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    // With an accepted offer on the books, a new offer for the child is
    // rejected at creation and the message insert rolls back with it.
    let before = MessageService::get_messages(&db, conversation, tutor, 1, 50)
        .await
        .unwrap()
        .total;
    let result =
        MessageService::create_message(&db, &users, tutor, UserRole::Tutor, &offer_request).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
    let after = MessageService::get_messages(&db, conversation, tutor, 1, 50)
        .await
        .unwrap()
        .total;
    assert_eq!(before, after);
}

#[tokio::test]
#[ignore]
async fn bulk_delete_only_touches_own_messages() {
    let db = common::test_db().await;
    let users = PgUserDirectory::new(db.clone());
    let tutor = common::create_user(&db, "Tutor G", UserRole::Tutor).await;
    let parent = common::create_user(&db, "Parent G", UserRole::Parent).await;
    let conversation =
        ConversationService::create_conversation(&db, &users, tutor, direct_input(parent))
            .await
            .unwrap();

    let mine =
        MessageService::create_message(&db, &users, tutor, UserRole::Tutor, &text_message(conversation, "one"))
            .await
            .unwrap();
    let theirs = MessageService::create_message(
        &db,
        &users,
        parent,
        UserRole::Parent,
        &text_message(conversation, "two"),
    )
    .await
    .unwrap();

    let deleted = MessageService::bulk_delete_messages(&db, &[mine.id, theirs.id], tutor)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let page = MessageService::get_messages(&db, conversation, tutor, 1, 20)
        .await
        .unwrap();
    let other_row = page.messages.iter().find(|m| m.id == theirs.id).unwrap();
    assert_eq!(other_row.content, "two");
}
