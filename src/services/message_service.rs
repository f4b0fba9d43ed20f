use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::conversation::{ConversationKind, ConversationStatus};
use crate::models::message::{MessageKind, MessageMeta, MessageStatus, DELETED_TOMBSTONE};
use crate::routes::messages::{CreateMessageRequest, MessageDto, MessagesPage};
use crate::routes::offers::OfferDto;
use crate::services::offer_service::{NewOffer, OfferService};
use crate::services::participant_service::ParticipantService;
use crate::services::user_directory::{UserDirectory, UserRole};

pub struct MessageService;

impl MessageService {
    /// Transactional message creation.
    ///
    /// All-or-nothing: membership check, reply-to validation, the message
    /// row, and (for offer/file/audio kinds) the linked offer row or copied
    /// attachment metadata commit together or not at all. Fan-out and push
    /// happen strictly after commit and are the caller's responsibility.
    pub async fn create_message(
        db: &Pool<Postgres>,
        users: &dyn UserDirectory,
        sender_id: Uuid,
        sender_role: UserRole,
        req: &CreateMessageRequest,
    ) -> Result<MessageDto, AppError> {
        let conversation_id = req.conversation_id;

        if req.kind == MessageKind::System {
            return Err(AppError::BadRequest(
                "system messages are generated by the service".into(),
            ));
        }

        if !ParticipantService::is_active_participant(db, conversation_id, sender_id).await? {
            return Err(AppError::Forbidden);
        }

        let conv = sqlx::query("SELECT kind, status FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;
        let conv_kind_s: String = conv.get("kind");
        let conv_status_s: String = conv.get("status");
        let conv_kind = ConversationKind::parse(&conv_kind_s).ok_or(AppError::Internal)?;
        let conv_status = ConversationStatus::parse(&conv_status_s).ok_or(AppError::Internal)?;
        if conv_status != ConversationStatus::Active {
            return Err(AppError::BadRequest("conversation is not active".into()));
        }

        if matches!(req.kind, MessageKind::Text | MessageKind::Image)
            && req.content.trim().is_empty()
        {
            return Err(AppError::BadRequest("message content cannot be empty".into()));
        }

        // Offer validations that touch collaborators run before the write
        // transaction; the accepted-conflict check runs inside it.
        let offer_receiver = if req.kind == MessageKind::Offer {
            if sender_role != UserRole::Tutor {
                return Err(AppError::Forbidden);
            }
            let payload = req.offer.as_ref().ok_or_else(|| {
                AppError::BadRequest("offer messages require an offer payload".into())
            })?;
            if conv_kind != ConversationKind::Direct {
                return Err(AppError::BadRequest(
                    "offers are only available in direct conversations".into(),
                ));
            }
            if payload.amount_monthly <= 0 {
                return Err(AppError::BadRequest(
                    "offer amount must be positive".into(),
                ));
            }
            let receiver = ParticipantService::other_active_participants(
                db,
                conversation_id,
                sender_id,
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::BadRequest("conversation has no receiver for the offer".into())
            })?;
            if !users.child_exists(receiver, &payload.child_name).await? {
                return Err(AppError::BadRequest(format!(
                    "child '{}' not found under the receiver's account",
                    payload.child_name
                )));
            }
            Some(receiver)
        } else {
            None
        };

        let mut tx = db.begin().await?;

        if let Some(reply_to_id) = req.reply_to_id {
            let target =
                sqlx::query("SELECT conversation_id FROM messages WHERE id = $1")
                    .bind(reply_to_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::BadRequest("reply target not found".into()))?;
            let target_conversation: Uuid = target.get("conversation_id");
            if target_conversation != conversation_id {
                return Err(AppError::BadRequest(
                    "reply target belongs to a different conversation".into(),
                ));
            }
        }

        // File/audio messages copy display metadata from the attachment row,
        // which must live in the same conversation.
        let meta = match req.kind {
            MessageKind::File | MessageKind::Audio => {
                let file_id = req.file_id.ok_or_else(|| {
                    AppError::BadRequest("file_id is required for attachment messages".into())
                })?;
                Self::attachment_meta(&mut tx, conversation_id, file_id).await?
            }
            _ => MessageMeta::Text,
        };

        let message_id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, kind, status, reply_to_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, 'sent', $6, $7) \
             RETURNING created_at",
        )
        .bind(message_id)
        .bind(conversation_id)
        .bind(sender_id)
        .bind(&req.content)
        .bind(req.kind.as_str())
        .bind(req.reply_to_id)
        .bind(Json(&meta))
        .fetch_one(&mut *tx)
        .await?;
        let created_at: DateTime<Utc> = row.get("created_at");

        let (meta, offer) = if req.kind == MessageKind::Offer {
            let receiver_id = offer_receiver.ok_or(AppError::Internal)?;
            let payload = req.offer.as_ref().ok_or(AppError::Internal)?;

            let conflict: bool = sqlx::query_scalar(
                "SELECT EXISTS( \
                   SELECT 1 FROM offers \
                   WHERE conversation_id = $1 AND sender_id = $2 AND receiver_id = $3 \
                     AND child_name = $4 AND status = 'accepted')",
            )
            .bind(conversation_id)
            .bind(sender_id)
            .bind(receiver_id)
            .bind(&payload.child_name)
            .fetch_one(&mut *tx)
            .await?;
            if conflict {
                return Err(AppError::BadRequest(format!(
                    "an accepted offer already exists for child '{}'",
                    payload.child_name
                )));
            }

            let offer = OfferService::create_in_tx(
                &mut tx,
                NewOffer {
                    conversation_id,
                    sender_id,
                    receiver_id,
                    message_id,
                    payload,
                },
            )
            .await?;

            // Back-link the offer into the message's structured metadata.
            let meta = MessageMeta::Offer { offer_id: offer.id };
            sqlx::query("UPDATE messages SET metadata = $1 WHERE id = $2")
                .bind(Json(&meta))
                .bind(message_id)
                .execute(&mut *tx)
                .await?;
            (meta, Some(offer))
        } else {
            (meta, None)
        };

        sqlx::query(
            "UPDATE conversations SET last_message_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(MessageDto {
            id: message_id,
            conversation_id,
            sender_id,
            content: req.content.clone(),
            kind: req.kind,
            status: MessageStatus::Sent,
            reply_to_id: req.reply_to_id,
            edited_at: None,
            metadata: meta,
            created_at,
            offer,
        })
    }

    async fn attachment_meta(
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
        file_id: Uuid,
    ) -> Result<MessageMeta, AppError> {
        let row = sqlx::query(
            "SELECT id, url, original_name, mimetype, size, thumbnail_url, metadata \
             FROM files \
             WHERE id = $1 AND conversation_id = $2 AND status = 'active'",
        )
        .bind(file_id)
        .bind(conversation_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest("attachment not found in this conversation".into())
        })?;

        let extras: Json<serde_json::Value> = row.get("metadata");
        Ok(MessageMeta::Attachment {
            file_id: row.get("id"),
            url: row.get("url"),
            name: row.get("original_name"),
            mimetype: row.get("mimetype"),
            size: row.get("size"),
            thumbnail_url: row.try_get("thumbnail_url").ok(),
            duration_ms: extras.0.get("duration_ms").and_then(|v| v.as_i64()),
        })
    }

    /// Paginated history, newest first. Soft-deleted messages stay visible
    /// with tombstone content; offer messages embed their linked offer.
    pub async fn get_messages(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<MessagesPage, AppError> {
        if !ParticipantService::is_active_participant(db, conversation_id, user_id).await? {
            return Err(AppError::Forbidden);
        }

        let limit = limit.clamp(1, 100);
        let offset = (page.max(1) - 1) * limit;

        let rows = sqlx::query(
            "SELECT id, conversation_id, sender_id, content, kind, status, reply_to_id, \
                    edited_at, metadata, created_at \
             FROM messages \
             WHERE conversation_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(Self::row_to_dto(row)?);
        }

        // Embed linked offers for offer messages in one query.
        let offer_message_ids: Vec<Uuid> = messages
            .iter()
            .filter(|m| m.kind == MessageKind::Offer)
            .map(|m| m.id)
            .collect();
        if !offer_message_ids.is_empty() {
            let offers = OfferService::for_messages(db, &offer_message_ids).await?;
            for message in &mut messages {
                if let Some(offer) = offers.get(&message.id) {
                    message.offer = Some(offer.clone());
                }
            }
        }

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
                .bind(conversation_id)
                .fetch_one(db)
                .await?;
        let unread_count = Self::unread_count(db, conversation_id, user_id).await?;

        Ok(MessagesPage {
            messages,
            total,
            unread_count,
            page: page.max(1),
            limit,
        })
    }

    /// Messages from other senders, not deleted, created after the caller's
    /// read cursor (or since epoch when the cursor is unset).
    pub async fn unread_count(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages m \
             WHERE m.conversation_id = $1 AND m.sender_id <> $2 AND m.status <> 'deleted' \
               AND m.created_at > COALESCE( \
                     (SELECT cp.last_read_at FROM conversation_participants cp \
                      WHERE cp.conversation_id = $1 AND cp.user_id = $2), \
                     'epoch'::timestamptz)",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    pub async fn load_message(
        db: &Pool<Postgres>,
        message_id: Uuid,
    ) -> Result<MessageDto, AppError> {
        let row = sqlx::query(
            "SELECT id, conversation_id, sender_id, content, kind, status, reply_to_id, \
                    edited_at, metadata, created_at \
             FROM messages WHERE id = $1",
        )
        .bind(message_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)?;

        let mut dto = Self::row_to_dto(row)?;
        if dto.kind == MessageKind::Offer {
            let offers = OfferService::for_messages(db, &[dto.id]).await?;
            dto.offer = offers.get(&dto.id).cloned();
        }
        Ok(dto)
    }

    /// Only the original sender may edit; deleted messages are immutable.
    pub async fn update_message(
        db: &Pool<Postgres>,
        message_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<MessageDto, AppError> {
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("message content cannot be empty".into()));
        }

        let row = sqlx::query("SELECT sender_id, status FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;
        let sender_id: Uuid = row.get("sender_id");
        let status_s: String = row.get("status");
        if sender_id != user_id {
            return Err(AppError::Forbidden);
        }
        if MessageStatus::parse(&status_s) == Some(MessageStatus::Deleted) {
            return Err(AppError::BadRequest("message was deleted".into()));
        }

        sqlx::query(
            "UPDATE messages SET content = $1, edited_at = NOW(), updated_at = NOW() \
             WHERE id = $2",
        )
        .bind(content)
        .bind(message_id)
        .execute(db)
        .await?;

        Self::load_message(db, message_id).await
    }

    /// Soft delete: the row survives with tombstone content. Idempotent for
    /// the sender; a repeat delete is a no-op.
    pub async fn soft_delete_message(
        db: &Pool<Postgres>,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        let row = sqlx::query("SELECT sender_id FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;
        let sender_id: Uuid = row.get("sender_id");
        if sender_id != user_id {
            return Err(AppError::Forbidden);
        }

        sqlx::query(
            "UPDATE messages SET status = 'deleted', content = $1, updated_at = NOW() \
             WHERE id = $2 AND status <> 'deleted'",
        )
        .bind(DELETED_TOMBSTONE)
        .bind(message_id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Bulk soft delete restricted to the sender's own messages. Returns how
    /// many rows were tombstoned.
    pub async fn bulk_delete_messages(
        db: &Pool<Postgres>,
        message_ids: &[Uuid],
        user_id: Uuid,
    ) -> Result<u64, AppError> {
        if message_ids.is_empty() {
            return Err(AppError::BadRequest("no message ids given".into()));
        }
        let result = sqlx::query(
            "UPDATE messages SET status = 'deleted', content = $1, updated_at = NOW() \
             WHERE id = ANY($2) AND sender_id = $3 AND status <> 'deleted'",
        )
        .bind(DELETED_TOMBSTONE)
        .bind(message_ids)
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }

    /// Marks a single message read and advances the caller's cursor to that
    /// message's timestamp (never backward).
    pub async fn mark_message_read(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<DateTime<Utc>, AppError> {
        if !ParticipantService::is_active_participant(db, conversation_id, user_id).await? {
            return Err(AppError::BadRequest(
                "not a participant of this conversation".into(),
            ));
        }

        let row = sqlx::query(
            "SELECT sender_id, status, created_at FROM messages \
             WHERE id = $1 AND conversation_id = $2",
        )
        .bind(message_id)
        .bind(conversation_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)?;
        let sender_id: Uuid = row.get("sender_id");
        let status_s: String = row.get("status");
        let created_at: DateTime<Utc> = row.get("created_at");

        let mut tx = db.begin().await?;
        let cursor = ParticipantService::update_read_cursor(
            &mut *tx,
            conversation_id,
            user_id,
            created_at,
        )
        .await
        .map_err(|e| match e {
            AppError::Forbidden => {
                AppError::BadRequest("not a participant of this conversation".into())
            }
            other => other,
        })?;

        if sender_id != user_id
            && !matches!(
                MessageStatus::parse(&status_s),
                Some(MessageStatus::Read) | Some(MessageStatus::Deleted)
            )
        {
            sqlx::query("UPDATE messages SET status = 'read', updated_at = NOW() WHERE id = $1")
                .bind(message_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(cursor)
    }

    fn row_to_dto(row: sqlx::postgres::PgRow) -> Result<MessageDto, AppError> {
        let kind_s: String = row.get("kind");
        let status_s: String = row.get("status");
        let metadata: Json<MessageMeta> = row.get("metadata");
        Ok(MessageDto {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            sender_id: row.get("sender_id"),
            content: row.get("content"),
            kind: MessageKind::parse(&kind_s).ok_or(AppError::Internal)?,
            status: MessageStatus::parse(&status_s).ok_or(AppError::Internal)?,
            reply_to_id: row.try_get("reply_to_id").ok(),
            edited_at: row.try_get("edited_at").ok(),
            metadata: metadata.0,
            created_at: row.get("created_at"),
            offer: None,
        })
    }
}
