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
use crate::models::conversation::ConversationKind;
use crate::models::participant::ParticipantRole;
use crate::services::conversation_service::{
    ConversationService, ConversationSummary, CreateConversationInput,
};
use crate::services::participant_service::ParticipantService;
use crate::state::AppState;
use crate::websocket::events::broadcast_event;
use crate::websocket::message_types::WsOutboundEvent;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default = "default_conversation_kind")]
    pub kind: ConversationKind,
    pub participant_ids: Vec<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub max_participants: Option<i32>,
}

fn default_conversation_kind() -> ConversationKind {
    ConversationKind::Direct
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
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

/// POST /chat/conversations
///
/// Returns 200 with the existing conversation when a direct pair already has
/// one; 201 on a fresh create is not distinguished, both shape the summary.
pub async fn create_conversation(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationSummary>), AppError> {
    let conversation_id = ConversationService::create_conversation(
        &state.db,
        state.users.as_ref(),
        user.id,
        CreateConversationInput {
            kind: body.kind,
            participant_ids: body.participant_ids,
            name: body.name,
            description: body.description,
            is_private: body.is_private,
            max_participants: body.max_participants,
        },
    )
    .await?;

    let summary =
        ConversationService::get_conversation(&state.db, state.users.as_ref(), conversation_id, user.id)
            .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /chat/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    user: User,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let conversations = ConversationService::list_conversations(
        &state.db,
        state.users.as_ref(),
        user.id,
        params.page,
        params.limit,
    )
    .await?;
    Ok(Json(conversations))
}

/// GET /chat/conversations/:conversation_id
pub async fn get_conversation(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationSummary>, AppError> {
    let summary =
        ConversationService::get_conversation(&state.db, state.users.as_ref(), conversation_id, user.id)
            .await?;
    Ok(Json(summary))
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub conversation_id: Uuid,
    pub last_read_at: DateTime<Utc>,
}

/// PATCH /chat/conversations/:conversation_id/read
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let last_read_at = ConversationService::mark_as_read(&state.db, conversation_id, user.id).await?;

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

    Ok(Json(MarkReadResponse {
        conversation_id,
        last_read_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AddParticipantRequest {
    pub user_id: Uuid,
    #[serde(default = "default_role")]
    pub role: ParticipantRole,
}

fn default_role() -> ParticipantRole {
    ParticipantRole::Member
}

/// POST /chat/conversations/:conversation_id/participants
///
/// Group/channel only; direct conversations keep their fixed pair.
pub async fn add_participant(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<AddParticipantRequest>,
) -> Result<StatusCode, AppError> {
    let summary =
        ConversationService::get_conversation(&state.db, state.users.as_ref(), conversation_id, user.id)
            .await?;
    if summary.kind == ConversationKind::Direct {
        return Err(AppError::BadRequest(
            "participants of a direct conversation are fixed".into(),
        ));
    }
    if let Some(cap) = summary.max_participants {
        if summary.participant_count >= cap as i64 {
            return Err(AppError::BadRequest(
                "conversation is at its participant cap".into(),
            ));
        }
    }
    if state
        .users
        .find_active(body.user_id)
        .await?
        .is_none()
    {
        return Err(AppError::BadRequest("user does not exist".into()));
    }

    ParticipantService::add_participant(&state.db, conversation_id, body.user_id, body.role).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /chat/conversations/:conversation_id/participants/me
///
/// Soft-leave: the membership row stays for history with is_active=false.
pub async fn leave_conversation(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    ParticipantService::deactivate(&state.db, conversation_id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
