use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::app::error::{BlogError, FieldErrors};

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    redirect_to: Option<String>,
    fields: Option<FieldErrors>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<FieldErrors>,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            redirect_to: None,
            fields: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// Refused mutation: the client shows `message` and goes back to `redirect_to`.
    pub fn permission_denied(message: impl Into<String>, redirect_to: impl Into<String>) -> Self {
        Self {
            redirect_to: Some(redirect_to.into()),
            ..Self::forbidden(message)
        }
    }

    /// Form redisplay with per-field messages.
    pub fn validation(fields: FieldErrors) -> Self {
        Self {
            fields: Some(fields),
            ..Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid input")
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<BlogError> for AppError {
    fn from(err: BlogError) -> Self {
        match err {
            BlogError::NotFound(entity) => Self::not_found(format!("{} not found", entity)),
            BlogError::PermissionDenied {
                message,
                redirect_to,
            } => Self::permission_denied(message, redirect_to),
            BlogError::Validation(fields) => Self::validation(fields),
            BlogError::Conflict(message) => Self::conflict(message),
            BlogError::Store(_) => Self::internal("internal server error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            redirect_to: self.redirect_to,
            fields: self.fields,
        });
        (self.status, body).into_response()
    }
}
