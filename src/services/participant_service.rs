use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::participant::ParticipantRole;

pub struct ParticipantService;

impl ParticipantService {
    pub async fn is_active_participant(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AppError> {
        let rec = sqlx::query(
            "SELECT 1 FROM conversation_participants \
             WHERE conversation_id = $1 AND user_id = $2 AND is_active LIMIT 1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(rec.is_some())
    }

    /// Adds a participant, reactivating a previously soft-deactivated row.
    pub async fn add_participant(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
        role: ParticipantRole,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO conversation_participants (conversation_id, user_id, role) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, conversation_id) \
             DO UPDATE SET is_active = TRUE, role = EXCLUDED.role",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(db)
        .await?;
        Ok(())
    }

    /// Soft-leave. The row survives for history; only the flag flips.
    pub async fn deactivate(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE conversation_participants SET is_active = FALSE \
             WHERE conversation_id = $1 AND user_id = $2 AND is_active",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }

    /// Advances the caller's read cursor. Idempotent and monotonic: the
    /// cursor never moves backward. Returns the effective cursor.
    ///
    /// Generic over the executor so callers can run it inside their own
    /// transaction; this is the single owner of the cursor UPDATE.
    pub async fn update_read_cursor<'e, E>(
        db: E,
        conversation_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(
            "UPDATE conversation_participants \
             SET last_read_at = GREATEST(COALESCE(last_read_at, 'epoch'::timestamptz), $3) \
             WHERE conversation_id = $1 AND user_id = $2 AND is_active \
             RETURNING last_read_at",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(timestamp)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::Forbidden)?;
        Ok(row.get("last_read_at"))
    }

    pub async fn count_active(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversation_participants \
             WHERE conversation_id = $1 AND is_active",
        )
        .bind(conversation_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// Active participants other than the given user, oldest-joined first.
    pub async fn other_active_participants(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, AppError> {
        let rows = sqlx::query(
            "SELECT user_id FROM conversation_participants \
             WHERE conversation_id = $1 AND user_id <> $2 AND is_active \
             ORDER BY joined_at ASC",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(|r| r.get("user_id")).collect())
    }
}
