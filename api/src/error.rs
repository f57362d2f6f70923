use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API Error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("Unauthorized")]
    Unauthorized,

    /// Authorization denied. The message never names the rule or role that denied.
    #[error("{0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    /// The route is authorized but its backend is not part of this server.
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Error response structure for OpenAPI documentation
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// The generic denial returned by role authorization.
    pub fn unauthorized_user() -> Self {
        ApiError::Forbidden("user unauthorized".to_string())
    }

    /// Denial for a resource of type `label` (`namespace`, `gitconfig`).
    pub fn unauthorized_for(label: &str) -> Self {
        ApiError::Forbidden(format!("user unauthorized for {}", label))
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// Get error code for the error type
    pub fn error_code(&self) -> &str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::NotImplemented(_) => "NOT_IMPLEMENTED",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let challenge = matches!(self, ApiError::Unauthorized);
        let error_response = ApiErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details: None,
            },
        };

        let mut response = (status, Json(error_response)).into_response();
        if challenge {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"paas\""),
            );
        }
        response
    }
}

impl From<user::UserError> for ApiError {
    fn from(err: user::UserError) -> Self {
        match err {
            user::UserError::InvalidCredentials | user::UserError::UserNotFound(_) => {
                ApiError::Unauthorized
            }
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
