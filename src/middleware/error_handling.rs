use crate::error::AppError;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// Structured error body returned to REST callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub code: String,
}

/// Map domain errors to HTTP responses.
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = match err {
        AppError::BadRequest(_) => "INVALID_REQUEST",
        AppError::Unauthorized => "UNAUTHORIZED",
        AppError::Forbidden => "FORBIDDEN",
        AppError::NotFound => "NOT_FOUND",
        AppError::Database(_) => "DATABASE_ERROR",
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            "INTERNAL_SERVER_ERROR"
        }
    };

    // Internal details stay out of the response body.
    let message = match err {
        AppError::Database(_) | AppError::Config(_) | AppError::StartServer(_) => {
            "internal server error".to_string()
        }
        other => other.to_string(),
    };

    let response = ErrorResponse {
        error: match status {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
        .to_string(),
        message,
        status: status.as_u16(),
        code: code.to_string(),
    };

    (status, response)
}

pub fn into_response(err: AppError) -> impl IntoResponse {
    if err.status_code() >= 500 {
        tracing::error!(error = %err, "request failed");
    }
    let (status, response) = map_error(&err);
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_bad_request_to_400() {
        let (status, body) = map_error(&AppError::BadRequest("nope".into()));
        assert_eq!(status.as_u16(), 400);
        assert_eq!(body.code, "INVALID_REQUEST");
        assert!(body.message.contains("nope"));
    }

    #[test]
    fn maps_forbidden_to_403() {
        let (status, body) = map_error(&AppError::Forbidden);
        assert_eq!(status.as_u16(), 403);
        assert_eq!(body.code, "FORBIDDEN");
    }

    #[test]
    fn maps_not_found_to_404() {
        let (status, _) = map_error(&AppError::NotFound);
        assert_eq!(status.as_u16(), 404);
    }

    #[test]
    fn hides_database_details() {
        let (status, body) = map_error(&AppError::Database(sqlx::Error::RowNotFound));
        assert_eq!(status.as_u16(), 500);
        assert_eq!(body.message, "internal server error");
    }
}
