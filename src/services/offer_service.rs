use std::collections::HashMap;

use chrono::Utc;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::MessageMeta;
use crate::models::offer::OfferStatus;
use crate::routes::messages::OfferPayload;
use crate::routes::offers::OfferDto;

pub struct NewOffer<'a> {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub message_id: Uuid,
    pub payload: &'a OfferPayload,
}

pub struct OfferService;

impl OfferService {
    /// Inserts the offer row inside the message-creation transaction.
    /// Offers are never created independently of their parent message.
    pub async fn create_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        new: NewOffer<'_>,
    ) -> Result<OfferDto, AppError> {
        let id = Uuid::new_v4();
        let payload = new.payload;
        let row = sqlx::query(
            "INSERT INTO offers \
               (id, conversation_id, sender_id, receiver_id, message_id, child_name, \
                amount_monthly, subject, start_date, start_time, end_time, description, \
                status, days_of_week) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'pending', $13) \
             RETURNING created_at",
        )
        .bind(id)
        .bind(new.conversation_id)
        .bind(new.sender_id)
        .bind(new.receiver_id)
        .bind(new.message_id)
        .bind(&payload.child_name)
        .bind(payload.amount_monthly)
        .bind(&payload.subject)
        .bind(payload.start_date)
        .bind(&payload.start_time)
        .bind(&payload.end_time)
        .bind(&payload.description)
        .bind(Json(&payload.days_of_week))
        .fetch_one(&mut **tx)
        .await?;

        Ok(OfferDto {
            id,
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            message_id: new.message_id,
            child_name: payload.child_name.clone(),
            amount_monthly: payload.amount_monthly,
            subject: payload.subject.clone(),
            start_date: payload.start_date,
            start_time: payload.start_time.clone(),
            end_time: payload.end_time.clone(),
            description: payload.description.clone(),
            status: OfferStatus::Pending,
            days_of_week: payload.days_of_week.clone(),
            created_at: row.get("created_at"),
        })
    }

    pub async fn get_offer(db: &Pool<Postgres>, offer_id: Uuid) -> Result<OfferDto, AppError> {
        let row = sqlx::query(
            "SELECT id, conversation_id, sender_id, receiver_id, message_id, child_name, \
                    amount_monthly, subject, start_date, start_time, end_time, description, \
                    status, days_of_week, created_at \
             FROM offers WHERE id = $1",
        )
        .bind(offer_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)?;
        Self::row_to_dto(row)
    }

    /// Linked offers for a batch of offer messages, keyed by message id.
    pub async fn for_messages(
        db: &Pool<Postgres>,
        message_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, OfferDto>, AppError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, sender_id, receiver_id, message_id, child_name, \
                    amount_monthly, subject, start_date, start_time, end_time, description, \
                    status, days_of_week, created_at \
             FROM offers WHERE message_id = ANY($1)",
        )
        .bind(message_ids)
        .fetch_all(db)
        .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let dto = Self::row_to_dto(row)?;
            out.insert(dto.message_id, dto);
        }
        Ok(out)
    }

    /// PENDING → ACCEPTED | REJECTED. Terminal offers never re-transition;
    /// acceptance is arbitrated by the accepted-triple unique index. The
    /// transition and a system message recording the outcome commit together.
    pub async fn respond(
        db: &Pool<Postgres>,
        offer_id: Uuid,
        user_id: Uuid,
        next: OfferStatus,
    ) -> Result<(OfferDto, Uuid), AppError> {
        if !next.is_terminal() {
            return Err(AppError::BadRequest(
                "offer can only be accepted or rejected".into(),
            ));
        }

        let current = Self::get_offer(db, offer_id).await?;
        if current.receiver_id != user_id {
            return Err(AppError::Forbidden);
        }
        if !current.status.can_transition_to(next) {
            return Err(AppError::BadRequest(format!(
                "offer is already {}",
                current.status.as_str()
            )));
        }

        let mut tx = db.begin().await?;

        let updated = sqlx::query(
            "UPDATE offers SET status = $1, updated_at = NOW() \
             WHERE id = $2 AND status = 'pending'",
        )
        .bind(next.as_str())
        .bind(offer_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if AppError::is_unique_violation(&e) {
                AppError::BadRequest(format!(
                    "an accepted offer already exists for child '{}'",
                    current.child_name
                ))
            } else {
                e.into()
            }
        })?;
        if updated.rows_affected() == 0 {
            // Raced with another responder; the offer is terminal now.
            return Err(AppError::BadRequest("offer is no longer pending".into()));
        }

        let event = match next {
            OfferStatus::Accepted => "offer_accepted",
            OfferStatus::Rejected => "offer_rejected",
            OfferStatus::Pending => unreachable!(),
        };
        let system_content = match next {
            OfferStatus::Accepted => format!("Offer for {} was accepted", current.child_name),
            _ => format!("Offer for {} was rejected", current.child_name),
        };

        let system_message_id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, kind, status, metadata) \
             VALUES ($1, $2, $3, $4, 'system', 'sent', $5)",
        )
        .bind(system_message_id)
        .bind(current.conversation_id)
        .bind(user_id)
        .bind(&system_content)
        .bind(Json(MessageMeta::System {
            event: event.into(),
        }))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE conversations SET last_message_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(current.conversation_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut dto = current;
        dto.status = next;
        Ok((dto, system_message_id))
    }

    fn row_to_dto(row: sqlx::postgres::PgRow) -> Result<OfferDto, AppError> {
        let status_s: String = row.get("status");
        let days: Json<Vec<String>> = row.get("days_of_week");
        Ok(OfferDto {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            sender_id: row.get("sender_id"),
            receiver_id: row.get("receiver_id"),
            message_id: row.get("message_id"),
            child_name: row.get("child_name"),
            amount_monthly: row.get("amount_monthly"),
            subject: row.get("subject"),
            start_date: row.get("start_date"),
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            description: row.try_get("description").ok(),
            status: OfferStatus::parse(&status_s).ok_or(AppError::Internal)?,
            days_of_week: days.0,
            created_at: row.get("created_at"),
        })
    }
}
