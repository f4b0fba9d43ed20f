use async_trait::async_trait;
use serde_json::json;

use crate::error::AppError;

/// Narrow seam onto the push provider. Delivery is always best-effort; the
/// dispatcher records the outcome and never propagates failures.
#[async_trait]
pub trait PushNotifier: Send + Sync {
    fn is_configured(&self) -> bool {
        true
    }

    async fn send(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> Result<(), AppError>;
}

/// FCM push over the legacy HTTP API.
pub struct FcmPush {
    http: reqwest::Client,
    server_key: String,
    endpoint: String,
}

impl FcmPush {
    pub fn new(server_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            server_key,
            endpoint: "https://fcm.googleapis.com/fcm/send".into(),
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(server_key: String, endpoint: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            server_key,
            endpoint,
        }
    }
}

#[async_trait]
impl PushNotifier for FcmPush {
    async fn send(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> Result<(), AppError> {
        let payload = json!({
            "to": device_token,
            "notification": {
                "title": title,
                "body": body,
                "sound": "default",
            },
            "data": data,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Config(format!("fcm send: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Config(format!(
                "fcm responded with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Stand-in when no FCM key is configured; dispatch records `skipped`.
pub struct DisabledPush;

#[async_trait]
impl PushNotifier for DisabledPush {
    fn is_configured(&self) -> bool {
        false
    }

    async fn send(
        &self,
        _device_token: &str,
        _title: &str,
        _body: &str,
        _data: &serde_json::Value,
    ) -> Result<(), AppError> {
        Ok(())
    }
}
