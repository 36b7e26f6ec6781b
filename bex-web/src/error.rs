//! Web 层错误类型
//!
//! 错误按发生的阶段分为三层：
//!
//! 1. **配置层级** - 启动阶段的注册冲突、路由模板解析失败、控制器加载失败，
//!    直接返回给启动代码，应用应当立即退出
//! 2. **请求解析层级** - JSON、表单、multipart 解析失败返回 400，请求体过大返回 413
//! 3. **分发层级** - 结果构造参数错误、注册表缺少兜底处理器
//!
//! 控制器自身的错误不属于这里：它们以 `anyhow::Error` 的形式交给
//! `exception` 处理器。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::registry::RegistryKind;
use crate::template::TemplateError;

#[derive(Error, Debug)]
pub enum WebError {
    // ========== 1. 配置层级错误 ==========
    /// 重复注册结果构造器或结果处理器
    #[error("Can not overwrite {kind} \"{name}\"")]
    DuplicateRegistration { kind: RegistryKind, name: String },

    /// 路由模板无法解析
    #[error("Can not parse route \"{template}\"")]
    RouteParse { template: String },

    /// 宿主路由不支持的 HTTP 方法
    #[error("Unsupported HTTP method \"{method}\" for route \"{path}\"")]
    UnsupportedMethod { method: String, path: String },

    /// 同一个方法和路径被绑定了两次
    #[error("Route {method} {path} is already bound")]
    DuplicateRoute { method: String, path: String },

    /// 路径与已绑定的路径冲突（例如同一位置的路径参数名不同）
    #[error("Route \"{path}\" conflicts with a bound route: {message}")]
    RouteConflict { path: String, message: String },

    #[error("Controller \"{name}\" is defined more than once")]
    DuplicateController { name: String },

    #[error("Failed to load controllers from {path}: {message}")]
    ControllerLoad { path: String, message: String },

    #[error(transparent)]
    Core(#[from] bex_core::CoreError),

    // ========== 2. 请求解析层级错误 ==========
    /// JSON 解析错误 - 400 Bad Request
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// 表单或 multipart 数据解析错误 - 400 Bad Request
    #[error("Invalid form data: {message}")]
    FormParse { message: String },

    /// 请求体超过大小限制 - 413 Payload Too Large
    #[error("Payload too large: {message}")]
    PayloadTooLarge { message: String },

    // ========== 3. 分发层级错误 ==========
    /// 没有注册对应的处理器（包括兜底的 `undefined`）
    #[error("No result handler registered under \"{name}\"")]
    MissingHandler { name: String },

    #[error("No result constructor registered under \"{name}\"")]
    UnknownResult { name: String },

    /// 结果构造器收到的参数不合法
    #[error("Invalid arguments for result \"{kind}\": {message}")]
    InvalidResultArgs { kind: String, message: String },

    #[error("Invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 内部服务器错误 - 500 Internal Server Error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl WebError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebError::JsonParse { .. } | WebError::FormParse { .. } => StatusCode::BAD_REQUEST,
            WebError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn invalid_args(kind: &str, message: impl Into<String>) -> Self {
        WebError::InvalidResultArgs {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 5xx 不向客户端暴露内部细节
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            status.canonical_reason().unwrap_or("Internal Server Error").to_string()
        } else {
            tracing::debug!(error = %self, "Rejected request");
            self.to_string()
        };

        ErrorResponse::new(status, message).into_response()
    }
}

/// 标准错误响应格式
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Unknown Error").to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_errors_are_client_errors() {
        let err = WebError::FormParse {
            message: "bad boundary".into(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = WebError::MissingHandler {
            name: "undefined".into(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = WebError::PayloadTooLarge {
            message: "limit is 1024 bytes".into(),
        };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_duplicate_registration_message() {
        let err = WebError::DuplicateRegistration {
            kind: RegistryKind::Handler,
            name: "json".into(),
        };
        assert_eq!(err.to_string(), "Can not overwrite handler \"json\"");
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let response = WebError::Internal("db password leaked".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Internal Server Error");
        assert_eq!(json["status"], 500);
    }
}
