use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Shared signing secret for REST bearer tokens and the WebSocket
    /// handshake (HS256).
    pub jwt_secret: String,
    /// FCM legacy server key; push delivery is disabled when absent.
    pub fcm_server_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;
        let fcm_server_key = match env::var("FCM_SERVER_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => None,
        };

        Ok(Self {
            database_url,
            port,
            jwt_secret,
            fcm_server_key,
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/chat_test".into(),
            port: 3000,
            jwt_secret: "test-secret".into(),
            fcm_server_key: None,
        }
    }
}
