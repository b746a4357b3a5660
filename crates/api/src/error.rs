//! HTTP error responses.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde_json::json;
use tracing::error;

use agora_core::voting::VoteError;
use agora_shared::AppError;

/// Error returned by handlers.
///
/// Renders as `{"error": <code>, "message": <text>}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Not found with a custom message.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into()).into()
    }
}

fn status_of(err: &AppError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self {
            status: status_of(&err),
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

impl From<VoteError> for ApiError {
    fn from(err: VoteError) -> Self {
        let code = err.error_code();
        let app = AppError::from(err);
        Self {
            status: status_of(&app),
            code,
            message: app.to_string(),
        }
    }
}

impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        match err {
            // Same code the ledger reports, whichever read hit the outage.
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => {
                VoteError::storage(err.to_string()).into()
            }
            other => AppError::Database(other.to_string()).into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            code: "INVALID_REQUEST_BODY",
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, code = self.code, message = %self.message, "Request failed");
        }

        (
            self.status,
            Json(json!({
                "error": self.code.to_ascii_lowercase(),
                "message": self.message,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(VoteError::invalid_value(5), StatusCode::BAD_REQUEST, "INVALID_VOTE_VALUE")]
    #[case(
        VoteError::UnknownVoter(agora_shared::types::UserId::new()),
        StatusCode::UNAUTHORIZED,
        "UNKNOWN_VOTER"
    )]
    #[case(VoteError::storage("down"), StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")]
    fn test_vote_error_mapping(
        #[case] err: VoteError,
        #[case] status: StatusCode,
        #[case] code: &str,
    ) {
        let api = ApiError::from(err);
        assert_eq!(api.status(), status);
        assert_eq!(api.code(), code);
    }

    #[test]
    fn test_connection_errors_are_unavailable() {
        let api = ApiError::from(DbErr::Conn(sea_orm::RuntimeErr::Internal(
            "Disconnected".to_string(),
        )));
        assert_eq!(api.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api.code(), "STORAGE_UNAVAILABLE");

        let api = ApiError::from(DbErr::Custom("boom".to_string()));
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_body_shape() {
        use http_body_util::BodyExt;

        let response = ApiError::not_found("post missing").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "not_found");
        assert_eq!(json["message"], "Not found: post missing");
    }
}
