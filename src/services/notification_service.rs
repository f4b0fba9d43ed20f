use serde_json::json;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::message::MessageKind;
use crate::routes::messages::MessageDto;
use crate::services::participant_service::ParticipantService;
use crate::services::push::PushNotifier;
use crate::services::user_directory::UserDirectory;
use crate::state::AppState;

pub struct NotificationService;

impl NotificationService {
    /// Best-effort push to one receiver, plus an in-app notification record.
    ///
    /// Never participates in the message-create transaction and never
    /// returns an error: a missing device token or a provider failure is
    /// recorded in the notification row's status and logged.
    pub async fn dispatch(
        db: &Pool<Postgres>,
        users: &dyn UserDirectory,
        push: &dyn PushNotifier,
        receiver_id: Uuid,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) {
        let token = match users.device_token(receiver_id).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(%receiver_id, error = %e, "device token lookup failed");
                None
            }
        };

        let status = match token {
            None => "skipped",
            Some(_) if !push.is_configured() => "skipped",
            Some(ref token) => match push.send(token, title, body, &data).await {
                Ok(()) => "sent",
                Err(e) => {
                    tracing::warn!(%receiver_id, error = %e, "push delivery failed");
                    "failed"
                }
            },
        };

        let inserted = sqlx::query(
            "INSERT INTO notifications (user_id, title, body, data, status) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(receiver_id)
        .bind(title)
        .bind(body)
        .bind(&data)
        .bind(status)
        .execute(db)
        .await;
        if let Err(e) = inserted {
            tracing::error!(%receiver_id, error = %e, "failed to record notification");
        }
    }

    /// Notifies every other active participant about a new message.
    /// Spawn-and-forget from the write path; failures stay here.
    pub async fn notify_new_message(state: AppState, message: MessageDto) {
        let sender_name = match state.users.find_active(message.sender_id).await {
            Ok(Some(profile)) => profile.full_name,
            _ => "New message".to_string(),
        };
        let body = Self::preview(&message);
        let data = json!({
            "conversation_id": message.conversation_id,
            "message_id": message.id,
            "kind": message.kind,
        });

        let receivers = match ParticipantService::other_active_participants(
            &state.db,
            message.conversation_id,
            message.sender_id,
        )
        .await
        {
            Ok(receivers) => receivers,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %message.conversation_id,
                    error = %e,
                    "receiver lookup failed; skipping push"
                );
                return;
            }
        };

        for receiver_id in receivers {
            Self::dispatch(
                &state.db,
                state.users.as_ref(),
                state.push.as_ref(),
                receiver_id,
                &sender_name,
                &body,
                data.clone(),
            )
            .await;
        }
    }

    fn preview(message: &MessageDto) -> String {
        match message.kind {
            MessageKind::Text | MessageKind::System => message.content.clone(),
            MessageKind::Image => "Sent a photo".into(),
            MessageKind::File => "Sent a file".into(),
            MessageKind::Audio => "Sent a voice message".into(),
            MessageKind::Offer => "Sent a tutoring offer".into(),
        }
    }
}
