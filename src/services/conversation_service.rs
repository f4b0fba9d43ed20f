use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::conversation::{direct_key, ConversationKind, ConversationStatus};
use crate::models::message::{MessageKind, MessageStatus};
use crate::services::message_service::MessageService;
use crate::services::participant_service::ParticipantService;
use crate::services::user_directory::UserDirectory;

#[derive(Debug, Clone, Serialize)]
pub struct LastMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub kind: MessageKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub status: ConversationStatus,
    /// For direct conversations this is the *other* participant's name, not
    /// a stored column.
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub created_by: Uuid,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_private: bool,
    pub max_participants: Option<i32>,
    pub participant_count: i64,
    pub unread_count: i64,
    pub last_message: Option<LastMessage>,
}

#[derive(Debug, Clone)]
pub struct CreateConversationInput {
    pub kind: ConversationKind,
    pub participant_ids: Vec<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_private: bool,
    pub max_participants: Option<i32>,
}

pub struct ConversationService;

impl ConversationService {
    /// Creates a conversation plus its participant rows as one unit of work.
    ///
    /// Direct conversations are idempotent-create: an existing active direct
    /// conversation between the pair is returned instead of a duplicate. The
    /// partial unique index on direct_key arbitrates concurrent racers.
    pub async fn create_conversation(
        db: &Pool<Postgres>,
        users: &dyn UserDirectory,
        creator_id: Uuid,
        input: CreateConversationInput,
    ) -> Result<Uuid, AppError> {
        let mut others: Vec<Uuid> = Vec::new();
        for id in &input.participant_ids {
            if *id != creator_id && !others.contains(id) {
                others.push(*id);
            }
        }

        if others.is_empty() {
            return Err(AppError::BadRequest(
                "conversation needs at least one other participant".into(),
            ));
        }
        if !users.all_active(&others).await? {
            return Err(AppError::BadRequest(
                "one or more participants do not exist".into(),
            ));
        }

        let key = match input.kind {
            ConversationKind::Direct => {
                if others.len() != 1 {
                    return Err(AppError::BadRequest(
                        "a direct conversation has exactly one other participant".into(),
                    ));
                }
                let key = direct_key(creator_id, others[0]);
                if let Some(existing) = Self::find_active_direct(db, &key).await? {
                    return Ok(existing);
                }
                Some(key)
            }
            ConversationKind::Group | ConversationKind::Channel => {
                if let Some(cap) = input.max_participants {
                    if (others.len() + 1) as i32 > cap {
                        return Err(AppError::BadRequest(
                            "participant count exceeds the conversation cap".into(),
                        ));
                    }
                }
                None
            }
        };

        let conversation_id = Uuid::new_v4();
        let mut tx = db.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO conversations \
               (id, name, description, kind, status, created_by, is_private, max_participants, direct_key) \
             VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, $8)",
        )
        .bind(conversation_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.kind.as_str())
        .bind(creator_id)
        .bind(input.is_private)
        .bind(input.max_participants)
        .bind(&key)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            tx.rollback().await.ok();
            if AppError::is_unique_violation(&e) {
                // Lost the direct-creation race; the winner's row is ours.
                if let Some(key) = key {
                    if let Some(existing) = Self::find_active_direct(db, &key).await? {
                        return Ok(existing);
                    }
                }
            }
            return Err(e.into());
        }

        sqlx::query(
            "INSERT INTO conversation_participants (conversation_id, user_id, role) \
             VALUES ($1, $2, 'admin')",
        )
        .bind(conversation_id)
        .bind(creator_id)
        .execute(&mut *tx)
        .await?;

        for member_id in &others {
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id, role) \
                 VALUES ($1, $2, 'member')",
            )
            .bind(conversation_id)
            .bind(member_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(conversation_id)
    }

    async fn find_active_direct(
        db: &Pool<Postgres>,
        key: &str,
    ) -> Result<Option<Uuid>, AppError> {
        let row = sqlx::query(
            "SELECT id FROM conversations \
             WHERE direct_key = $1 AND kind = 'direct' AND status = 'active'",
        )
        .bind(key)
        .fetch_optional(db)
        .await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Conversations where the caller has an active membership row, ordered
    /// by most-recent-message time descending; conversations with no
    /// messages sort last.
    pub async fn list_conversations(
        db: &Pool<Postgres>,
        users: &dyn UserDirectory,
        user_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        let limit = limit.clamp(1, 100);
        let offset = (page.max(1) - 1) * limit;

        let rows = sqlx::query(
            "SELECT c.id FROM conversations c \
             JOIN conversation_participants cp ON c.id = cp.conversation_id \
             WHERE cp.user_id = $1 AND cp.is_active AND c.status = 'active' \
             ORDER BY c.last_message_at DESC NULLS LAST, c.created_at DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.get("id");
            out.push(Self::load_summary(db, users, id, user_id).await?);
        }
        Ok(out)
    }

    /// Single-conversation retrieval with access enforcement.
    pub async fn get_conversation(
        db: &Pool<Postgres>,
        users: &dyn UserDirectory,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<ConversationSummary, AppError> {
        if !ParticipantService::is_active_participant(db, conversation_id, user_id).await? {
            return Err(AppError::Forbidden);
        }
        Self::load_summary(db, users, conversation_id, user_id).await
    }

    async fn load_summary(
        db: &Pool<Postgres>,
        users: &dyn UserDirectory,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<ConversationSummary, AppError> {
        let row = sqlx::query(
            "SELECT id, name, description, kind, status, created_by, last_message_at, \
                    is_private, max_participants \
             FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)?;

        let kind_s: String = row.get("kind");
        let status_s: String = row.get("status");
        let kind = ConversationKind::parse(&kind_s).ok_or(AppError::Internal)?;
        let status = ConversationStatus::parse(&status_s).ok_or(AppError::Internal)?;

        let mut name: Option<String> = row.try_get("name").ok();
        let mut avatar_url: Option<String> = None;

        // Direct conversations display the other participant, not a stored name.
        if kind == ConversationKind::Direct {
            let others =
                ParticipantService::other_active_participants(db, conversation_id, viewer_id)
                    .await?;
            if let Some(other_id) = others.first() {
                if let Some(profile) = users.find_active(*other_id).await? {
                    name = Some(profile.full_name);
                    avatar_url = profile.avatar_url;
                }
            }
        }

        let participant_count =
            ParticipantService::count_active(db, conversation_id).await?;
        let unread_count = MessageService::unread_count(db, conversation_id, viewer_id).await?;
        let last_message = Self::last_message(db, conversation_id).await?;

        Ok(ConversationSummary {
            id: row.get("id"),
            kind,
            status,
            name,
            description: row.try_get("description").ok(),
            avatar_url,
            created_by: row.get("created_by"),
            last_message_at: row.try_get("last_message_at").ok(),
            is_private: row.get("is_private"),
            max_participants: row.try_get("max_participants").ok(),
            participant_count,
            unread_count,
            last_message,
        })
    }

    async fn last_message(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
    ) -> Result<Option<LastMessage>, AppError> {
        let row = sqlx::query(
            "SELECT id, sender_id, kind, content, created_at FROM messages \
             WHERE conversation_id = $1 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(conversation_id)
        .fetch_optional(db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let kind_s: String = row.get("kind");
        Ok(Some(LastMessage {
            id: row.get("id"),
            sender_id: row.get("sender_id"),
            kind: MessageKind::parse(&kind_s).ok_or(AppError::Internal)?,
            content: row.get("content"),
            created_at: row.get("created_at"),
        }))
    }

    /// One transaction: advance the caller's read cursor to now and flip all
    /// other senders' not-yet-read messages to READ. Idempotent.
    pub async fn mark_as_read(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<DateTime<Utc>, AppError> {
        let mut tx = db.begin().await?;

        let last_read_at = ParticipantService::update_read_cursor(
            &mut *tx,
            conversation_id,
            user_id,
            Utc::now(),
        )
        .await
        .map_err(|e| match e {
            AppError::Forbidden => {
                AppError::BadRequest("not a participant of this conversation".into())
            }
            other => other,
        })?;

        sqlx::query(
            "UPDATE messages SET status = 'read', updated_at = NOW() \
             WHERE conversation_id = $1 AND sender_id <> $2 \
               AND status NOT IN ($3, $4)",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(MessageStatus::Read.as_str())
        .bind(MessageStatus::Deleted.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(last_read_at)
    }
}
