use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use resource_status_core::{ErrorRecord, MonitorError};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("API key is required")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(&'static str),

    /// 对外只暴露 `message`，原因写入日志
    #[error("{message}: {source}")]
    Internal {
        message: &'static str,
        #[source]
        source: MonitorError,
    },
}

impl ApiError {
    /// 包装处理器内部错误并记录原因
    pub fn internal(message: &'static str, source: MonitorError) -> Self {
        let record = ErrorRecord::from(&source);
        error!(
            error.name = %record.name,
            error.message = %record.message,
            error.cause = record.cause.as_deref(),
            "{}", message
        );
        ApiError::Internal { message, source }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingApiKey | ApiError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            // 认证失败只返回 error 字段
            ApiError::MissingApiKey | ApiError::InvalidApiKey => json!({ "error": self.to_string() }),
            ApiError::BadRequest(message) => json!({ "success": false, "error": message }),
            ApiError::NotFound(message) => json!({ "success": false, "error": message }),
            ApiError::Internal { message, .. } => json!({ "success": false, "error": message }),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::MissingApiKey.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::BadRequest("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("No resource usage data found").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::internal(
                "Failed to fetch resource usage data",
                MonitorError::Internal("boom".to_string())
            )
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_message_hides_cause() {
        let err = ApiError::internal(
            "Failed to fetch resource usage data",
            MonitorError::Queue("connection refused".to_string()),
        );
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
