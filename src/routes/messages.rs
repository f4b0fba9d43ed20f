use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::message::{MessageKind, MessageMeta, MessageStatus};
use crate::services::message_service::MessageService;
use crate::services::notification_service::NotificationService;
use crate::state::AppState;
use crate::websocket::events::broadcast_event;
use crate::websocket::message_types::WsOutboundEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferPayload {
    pub child_name: String,
    pub amount_monthly: i64,
    pub subject: String,
    pub start_date: chrono::NaiveDate,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub days_of_week: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    pub conversation_id: Uuid,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_kind")]
    pub kind: MessageKind,
    #[serde(default)]
    pub reply_to_id: Option<Uuid>,
    /// Attachment reference for file/audio messages.
    #[serde(default)]
    pub file_id: Option<Uuid>,
    /// Offer details; required when kind is offer.
    #[serde(default)]
    pub offer: Option<OfferPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub status: MessageStatus,
    pub reply_to_id: Option<Uuid>,
    pub edited_at: Option<DateTime<Utc>>,
    pub metadata: MessageMeta,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<crate::routes::offers::OfferDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesPage {
    pub messages: Vec<MessageDto>,
    pub total: i64,
    pub unread_count: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

/// POST /chat/messages
pub async fn send_message(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<MessageDto>), AppError> {
    let message =
        MessageService::create_message(&state.db, state.users.as_ref(), user.id, user.role, &body)
            .await?;

    // Post-commit: fan out to connected participants, then push best-effort.
    // Neither can fail the create.
    broadcast_event(
        &state.registry,
        message.conversation_id,
        &WsOutboundEvent::NewMessage {
            message: message.clone(),
        },
    )
    .await;
    tokio::spawn(NotificationService::notify_new_message(
        state.clone(),
        message.clone(),
    ));

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /chat/messages/conversation/:conversation_id
pub async fn get_message_history(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> Result<Json<MessagesPage>, AppError> {
    let page =
        MessageService::get_messages(&state.db, conversation_id, user.id, params.page, params.limit)
            .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub content: String,
}

/// PUT /chat/messages/:message_id
pub async fn update_message(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
    Json(body): Json<UpdateMessageRequest>,
) -> Result<Json<MessageDto>, AppError> {
    let message =
        MessageService::update_message(&state.db, message_id, user.id, &body.content).await?;
    Ok(Json(message))
}

/// DELETE /chat/messages/:message_id
pub async fn delete_message(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    MessageService::soft_delete_message(&state.db, message_id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub message_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

/// POST /chat/messages/bulk-delete
pub async fn bulk_delete_messages(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, AppError> {
    let deleted =
        MessageService::bulk_delete_messages(&state.db, &body.message_ids, user.id).await?;
    Ok(Json(BulkDeleteResponse { deleted }))
}

#[derive(Debug, Serialize)]
pub struct ReadCursorResponse {
    pub conversation_id: Uuid,
    pub last_read_at: DateTime<Utc>,
}

/// POST /chat/messages/conversation/:conversation_id/read/:message_id
pub async fn mark_message_read(
    State(state): State<AppState>,
    user: User,
    Path((conversation_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ReadCursorResponse>, AppError> {
    let last_read_at =
        MessageService::mark_message_read(&state.db, conversation_id, message_id, user.id).await?;

    broadcast_event(
        &state.registry,
        conversation_id,
        &WsOutboundEvent::MessageRead {
            conversation_id,
            user_id: user.id,
            last_read_at,
        },
    )
    .await;

    Ok(Json(ReadCursorResponse {
        conversation_id,
        last_read_at,
    }))
}
