//! Typed extractors that enforce authentication at the handler signature.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::services::user_directory::UserRole;

/// Authenticated user extracted from the auth middleware's extensions.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub role: UserRole,
}

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)?;
        Ok(User {
            id: user.id,
            role: user.role,
        })
    }
}
