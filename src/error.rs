// src/error.rs
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

use crate::domain::{ScanError, TransitionError};

#[derive(Debug)]
pub enum AppError {
    DatabaseError(sqlx::Error),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    ValidationError(String),
    InvalidTransition(String),
    Conflict(String),
    Internal(String),
}

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self { AppError::Unauthorized(msg.into()) }
    pub fn forbidden(msg: impl Into<String>) -> Self { AppError::Forbidden(msg.into()) }
    pub fn not_found(msg: impl Into<String>) -> Self { AppError::NotFound(msg.into()) }
    pub fn validation(msg: impl Into<String>) -> Self { AppError::ValidationError(msg.into()) }
    pub fn invalid_transition(msg: impl Into<String>) -> Self { AppError::InvalidTransition(msg.into()) }
    pub fn conflict(msg: impl Into<String>) -> Self { AppError::Conflict(msg.into()) }
    pub fn internal(msg: impl Into<String>) -> Self { AppError::Internal(msg.into()) }
    pub fn db(err: sqlx::Error) -> Self { AppError::DatabaseError(err) }

    /// Machine-readable code sent next to the human message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::DatabaseError(_) | AppError::Internal(_) => "internal_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationError(_) => "validation_error",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::Conflict(_) => "conflict",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DatabaseError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidTransition(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let error_message = match self {
            AppError::DatabaseError(e) => {
                tracing::error!(error = %e, "Database error");
                "Database error occurred".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                "Internal server error".to_string()
            }
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::ValidationError(msg)
            | AppError::InvalidTransition(msg)
            | AppError::Conflict(msg) => msg,
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

// Malformed bodies, paths and query strings are client input errors.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::InvalidTransition(err.to_string())
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Closed(e) => e.into(),
            ScanError::UnknownParcel(_) => AppError::NotFound(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SlipAction, SlipStatus};

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn transition_error_maps_to_conflict_with_code() {
        let err: AppError = TransitionError::NotAllowed {
            action: SlipAction::Ship,
            status: SlipStatus::Received,
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["code"], "invalid_transition");
        assert_eq!(body["error"], "cannot ship a shipping slip in status RECEIVED");
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        let response = AppError::internal("secret stack trace").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["code"], "internal_error");
    }

    #[test]
    fn unknown_parcel_is_not_found() {
        let err: AppError = ScanError::UnknownParcel("PCL-1".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
