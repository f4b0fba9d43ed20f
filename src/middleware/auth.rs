use axum::extract::State;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::user_directory::UserRole;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    /// Expiration time (unix timestamp).
    pub exp: i64,
}

/// Authenticated caller, resolved against the user directory.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
}

/// Validate an HS256 bearer token against the shared signing secret.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

/// Verifies the token and resolves the subject to an active user.
/// Admission condition is `is_active == true`; inactive or unknown subjects
/// are rejected.
pub async fn resolve_bearer(state: &AppState, token: &str) -> Result<AuthUser, AppError> {
    let claims = verify_jwt(token, &state.config.jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;
    let profile = state
        .users
        .find_active(user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(AuthUser {
        id: profile.id,
        role: profile.role,
    })
}

/// Middleware extracting the bearer token and stashing the authenticated
/// caller in request extensions for the `User` guard.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let user = resolve_bearer(&state, token).await?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str, secret: &str, exp: i64) -> String {
        let claims = Claims {
            sub: sub.into(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let id = Uuid::new_v4().to_string();
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = token_for(&id, "secret", exp);
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, id);
    }

    #[test]
    fn rejects_wrong_secret() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = token_for("user", "secret", exp);
        assert!(matches!(
            verify_jwt(&token, "other"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let exp = chrono::Utc::now().timestamp() - 3600;
        let token = token_for("user", "secret", exp);
        assert!(matches!(
            verify_jwt(&token, "secret"),
            Err(AppError::Unauthorized)
        ));
    }
}
