use application::{ApplicationError, SendError, ValidationError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::RepositoryError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
                retry_after_secs: None,
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }
}

impl From<SendError> for ApiError {
    fn from(error: SendError) -> Self {
        match error {
            SendError::Validation(err) => {
                let code = match err {
                    ValidationError::Empty => "EMPTY_MESSAGE",
                    ValidationError::TooLong { .. } => "MESSAGE_TOO_LONG",
                    ValidationError::MultipleAttachmentKinds => "MULTIPLE_ATTACHMENT_KINDS",
                };
                ApiError::new(StatusCode::BAD_REQUEST, code, err.to_string())
            }
            SendError::RateLimit(err) => {
                let code = match err.reason_code() {
                    "duplicate_spam" => "DUPLICATE_SPAM",
                    "long_message_spam" => "LONG_MESSAGE_SPAM",
                    _ => "RATE_LIMITED",
                };
                let mut api = ApiError::new(StatusCode::TOO_MANY_REQUESTS, code, err.to_string());
                api.body.retry_after_secs = Some(err.retry_after_secs());
                api
            }
            // 存储层原因对客户端不透明，只说"没存上"
            SendError::Persistence(_) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "PERSISTENCE_FAILED",
                "message could not be stored, try again",
            ),
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Repository(RepositoryError::NotFound { what }) => {
                ApiError::not_found(format!("{what} not found"))
            }
            ApplicationError::Repository(_) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "STORAGE_UNAVAILABLE",
                "storage unavailable",
            ),
            ApplicationError::Domain(err) => ApiError::bad_request(err.to_string()),
            ApplicationError::Broadcast(_)
            | ApplicationError::Presence(_)
            | ApplicationError::Attachment(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal error",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
