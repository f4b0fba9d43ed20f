use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Tutor,
    Parent,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Tutor => "tutor",
            UserRole::Parent => "parent",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tutor" => Some(UserRole::Tutor),
            "parent" => Some(UserRole::Parent),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub role: UserRole,
}

/// Narrow seam onto the user-service. The chat core never imports the
/// sibling service directly; tests substitute this trait.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolves a user only when the row exists and is active.
    async fn find_active(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppError>;

    /// True when every id resolves to an active user.
    async fn all_active(&self, user_ids: &[Uuid]) -> Result<bool, AppError>;

    /// Registered push address, if the user has one.
    async fn device_token(&self, user_id: Uuid) -> Result<Option<String>, AppError>;

    /// True when the named child is registered under the given parent.
    async fn child_exists(&self, parent_id: Uuid, name: &str) -> Result<bool, AppError>;
}

/// Production directory backed by the shared users/children tables.
#[derive(Clone)]
pub struct PgUserDirectory {
    db: Pool<Postgres>,
}

impl PgUserDirectory {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_active(&self, user_id: Uuid) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query(
            "SELECT id, full_name, avatar_url, role FROM users WHERE id = $1 AND is_active",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let role: String = row.get("role");
        Ok(Some(UserProfile {
            id: row.get("id"),
            full_name: row.get("full_name"),
            avatar_url: row.try_get("avatar_url").ok(),
            // Roles gate offer creation; an unknown stored role is data
            // corruption, not a default.
            role: UserRole::parse(&role).ok_or(AppError::Internal)?,
        }))
    }

    async fn all_active(&self, user_ids: &[Uuid]) -> Result<bool, AppError> {
        if user_ids.is_empty() {
            return Ok(true);
        }
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ANY($1) AND is_active")
                .bind(user_ids)
                .fetch_one(&self.db)
                .await?;
        // Duplicate ids in the input would overcount; callers pass a deduped list.
        Ok(count as usize == user_ids.len())
    }

    async fn device_token(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let token: Option<Option<String>> =
            sqlx::query_scalar("SELECT device_token FROM users WHERE id = $1 AND is_active")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(token.flatten().filter(|t| !t.trim().is_empty()))
    }

    async fn child_exists(&self, parent_id: Uuid, name: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 FROM children WHERE parent_id = $1 AND name = $2 LIMIT 1")
            .bind(parent_id)
            .bind(name)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_db_strings() {
        for role in [UserRole::Tutor, UserRole::Parent, UserRole::Admin] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("student"), None);
        assert_eq!(UserRole::parse(""), None);
    }
}
