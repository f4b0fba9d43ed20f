use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::offer::OfferStatus;
use crate::services::message_service::MessageService;
use crate::services::notification_service::NotificationService;
use crate::services::offer_service::OfferService;
use crate::state::AppState;
use crate::websocket::events::broadcast_event;
use crate::websocket::message_types::WsOutboundEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferDto {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub child_name: String,
    pub amount_monthly: i64,
    pub subject: String,
    pub start_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub days_of_week: Vec<String>,
    pub description: Option<String>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferAction {
    Accept,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct RespondToOfferRequest {
    pub action: OfferAction,
}

/// GET /chat/offers/:offer_id
pub async fn get_offer(
    State(state): State<AppState>,
    user: User,
    Path(offer_id): Path<Uuid>,
) -> Result<Json<OfferDto>, AppError> {
    let offer = OfferService::get_offer(&state.db, offer_id).await?;
    if offer.sender_id != user.id && offer.receiver_id != user.id {
        return Err(AppError::Forbidden);
    }
    Ok(Json(offer))
}

/// PATCH /chat/offers/:offer_id
pub async fn respond_to_offer(
    State(state): State<AppState>,
    user: User,
    Path(offer_id): Path<Uuid>,
    Json(body): Json<RespondToOfferRequest>,
) -> Result<Json<OfferDto>, AppError> {
    let accept = matches!(body.action, OfferAction::Accept);
    let next = if accept {
        OfferStatus::Accepted
    } else {
        OfferStatus::Rejected
    };
    let (offer, system_message_id) =
        OfferService::respond(&state.db, offer_id, user.id, next).await?;

    // The decision is committed; everything below is fan-out and push,
    // both best-effort.
    broadcast_event(
        &state.registry,
        offer.conversation_id,
        &WsOutboundEvent::OfferUpdated {
            conversation_id: offer.conversation_id,
            offer: offer.clone(),
        },
    )
    .await;
    if let Ok(system_message) = MessageService::load_message(&state.db, system_message_id).await {
        broadcast_event(
            &state.registry,
            offer.conversation_id,
            &WsOutboundEvent::NewMessage {
                message: system_message,
            },
        )
        .await;
    }

    let verb = if accept { "accepted" } else { "declined" };
    let title = format!("Offer {verb}");
    let body_text = format!("Your tutoring offer for {} was {verb}", offer.child_name);
    let data = serde_json::json!({
        "conversation_id": offer.conversation_id,
        "offer_id": offer.id,
        "status": offer.status.as_str(),
    });
    let state_for_push = state.clone();
    let offer_sender = offer.sender_id;
    tokio::spawn(async move {
        NotificationService::dispatch(
            &state_for_push.db,
            state_for_push.users.as_ref(),
            state_for_push.push.as_ref(),
            offer_sender,
            &title,
            &body_text,
            data,
        )
        .await;
    });

    Ok(Json(offer))
}
