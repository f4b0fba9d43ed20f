use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::types::Json as SqlJson;
use sqlx::Row;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::file::{FileRecord, FileStatus};
use crate::services::participant_service::ParticipantService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterFileRequest {
    pub conversation_id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: i64,
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form extras, e.g. {"duration_ms": 4200} for voice notes.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// POST /chat/files
///
/// Registers attachment metadata after the binary was uploaded to external
/// storage. The returned id is what sendMessage references as file_id.
pub async fn register_file(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<RegisterFileRequest>,
) -> Result<(StatusCode, Json<FileRecord>), AppError> {
    if !ParticipantService::is_active_participant(&state.db, body.conversation_id, user.id).await? {
        return Err(AppError::Forbidden);
    }
    if body.size <= 0 {
        return Err(AppError::BadRequest("file size must be positive".into()));
    }
    if body.url.trim().is_empty() {
        return Err(AppError::BadRequest("file url cannot be empty".into()));
    }

    let id = Uuid::new_v4();
    let metadata = body.metadata.unwrap_or_else(|| serde_json::json!({}));
    let row = sqlx::query(
        "INSERT INTO files \
           (id, conversation_id, user_id, filename, original_name, mimetype, size, url, \
            thumbnail_url, expires_at, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING created_at",
    )
    .bind(id)
    .bind(body.conversation_id)
    .bind(user.id)
    .bind(&body.filename)
    .bind(&body.original_name)
    .bind(&body.mimetype)
    .bind(body.size)
    .bind(&body.url)
    .bind(&body.thumbnail_url)
    .bind(body.expires_at)
    .bind(&metadata)
    .fetch_one(&state.db)
    .await?;

    let record = FileRecord {
        id,
        conversation_id: body.conversation_id,
        user_id: user.id,
        filename: body.filename,
        original_name: body.original_name,
        mimetype: body.mimetype,
        size: body.size,
        url: body.url,
        status: FileStatus::Active,
        thumbnail_url: body.thumbnail_url,
        expires_at: body.expires_at,
        metadata,
        created_at: row.get("created_at"),
    };
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /chat/files/:file_id
pub async fn get_file(
    State(state): State<AppState>,
    user: User,
    Path(file_id): Path<Uuid>,
) -> Result<Json<FileRecord>, AppError> {
    let row = sqlx::query(
        "SELECT id, conversation_id, user_id, filename, original_name, mimetype, size, url, \
                status, thumbnail_url, expires_at, metadata, created_at \
         FROM files WHERE id = $1",
    )
    .bind(file_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound)?;

    let conversation_id: Uuid = row.get("conversation_id");
    if !ParticipantService::is_active_participant(&state.db, conversation_id, user.id).await? {
        return Err(AppError::Forbidden);
    }

    let status_s: String = row.get("status");
    let metadata: SqlJson<serde_json::Value> = row.get("metadata");
    let record = FileRecord {
        id: row.get("id"),
        conversation_id,
        user_id: row.get("user_id"),
        filename: row.get("filename"),
        original_name: row.get("original_name"),
        mimetype: row.get("mimetype"),
        size: row.get("size"),
        url: row.get("url"),
        status: FileStatus::parse(&status_s).ok_or(AppError::Internal)?,
        thumbnail_url: row.try_get("thumbnail_url").ok(),
        expires_at: row.try_get("expires_at").ok(),
        metadata: metadata.0,
        created_at: row.get("created_at"),
    };
    Ok(Json(record))
}
