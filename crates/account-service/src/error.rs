//! 账户服务错误类型

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use notify_shared::error::ServiceError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    // 认证错误
    #[error("Token 已过期")]
    TokenExpired,
    #[error("无效的 Token: {0}")]
    InvalidToken(String),
    #[error("Token 类型不匹配: 期望 {expected}")]
    WrongTokenType { expected: &'static str },

    // 资源错误
    #[error("资源未就绪: {resource}")]
    NotReady { resource: &'static str },

    // 上游 API 错误
    #[error("上游接口返回 {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("上游请求失败: {0}")]
    Http(#[from] reqwest::Error),

    // 系统错误
    #[error(transparent)]
    Shared(#[from] ServiceError),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AccountError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::WrongTokenType { .. } => "WRONG_TOKEN_TYPE",
            Self::NotReady { .. } => "RESOURCE_NOT_READY",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Http(_) => "UPSTREAM_UNAVAILABLE",
            Self::Shared(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TokenExpired | Self::InvalidToken(_) | Self::WrongTokenType { .. } => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { .. } | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Shared(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "success": false,
            "code": self.code(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_status() {
        assert_eq!(AccountError::TokenExpired.code(), "TOKEN_EXPIRED");
        assert_eq!(
            AccountError::TokenExpired.status_code(),
            StatusCode::UNAUTHORIZED
        );

        let not_ready = AccountError::NotReady { resource: "api-ir" };
        assert_eq!(not_ready.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(not_ready.to_string(), "资源未就绪: api-ir");
    }

    #[test]
    fn test_shared_error_keeps_code() {
        let err = AccountError::from(ServiceError::transport("redis", "refused"));
        assert_eq!(err.code(), "TRANSPORT_ERROR");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
