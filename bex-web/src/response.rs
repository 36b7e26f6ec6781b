//! 响应接收端
//!
//! 结果处理器通过 [`ActionResponse`] 描述响应：渲染模板、重定向、写 JSON、
//! 设置响应头、以状态码结束、转发字节流。分发结束后统一转换为 Axum 的
//! [`Response`]。

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::WebError;
use crate::result::ByteStream;
use crate::template::TemplateEngine;

enum ResponseBody {
    Empty,
    Full(Bytes),
    Stream(ByteStream),
}

/// 响应接收端
pub struct ActionResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
    templates: Option<TemplateEngine>,
}

impl std::fmt::Debug for ActionResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}

impl Default for ActionResponse {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ActionResponse {
    /// `templates` 为 `None` 时 `render` 总是失败
    pub fn new(templates: Option<TemplateEngine>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
            templates,
        }
    }

    /// 渲染模板并作为 HTML 响应体
    pub fn render(&mut self, template: &str, data: &Map<String, Value>) -> Result<(), WebError> {
        let engine = self
            .templates
            .as_ref()
            .ok_or(crate::template::TemplateError::EngineNotConfigured)?;
        let html = engine.render(template, data)?;

        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        self.body = ResponseBody::Full(Bytes::from(html));
        Ok(())
    }

    /// 302 重定向
    pub fn redirect(&mut self, url: &str) -> Result<(), WebError> {
        let location = HeaderValue::from_str(url).map_err(|e| WebError::InvalidHeader {
            name: header::LOCATION.to_string(),
            message: e.to_string(),
        })?;

        self.status = StatusCode::FOUND;
        self.headers.insert(header::LOCATION, location);
        self.body = ResponseBody::Empty;
        Ok(())
    }

    pub fn send_json(&mut self, value: &Value) -> Result<(), WebError> {
        let body = serde_json::to_vec(value)?;
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = ResponseBody::Full(Bytes::from(body));
        Ok(())
    }

    /// 写入完整响应体并设置 `Content-Type`
    pub fn send_body(&mut self, content_type: &str, body: impl Into<Bytes>) -> Result<(), WebError> {
        self.set_header(header::CONTENT_TYPE.as_str(), content_type)?;
        self.body = ResponseBody::Full(body.into());
        Ok(())
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), WebError> {
        let invalid = |message: String| WebError::InvalidHeader {
            name: name.to_string(),
            message,
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;

        self.headers.insert(header_name, header_value);
        Ok(())
    }

    /// 以指定状态码结束，丢弃已有的响应体
    pub fn end_with_status(&mut self, status: StatusCode) {
        self.status = status;
        self.body = ResponseBody::Empty;
    }

    /// 把字节流转发给客户端
    pub fn pipe_stream(&mut self, stream: ByteStream) {
        self.body = ResponseBody::Stream(stream);
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 已经写入的完整响应体（流式响应返回 `None`）
    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Full(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Stream(_))
    }

    /// 取出当前内容，原位置留下一个共享同一模板引擎的新响应
    pub(crate) fn take(&mut self) -> ActionResponse {
        std::mem::replace(self, ActionResponse::new(self.templates.clone()))
    }
}

impl IntoResponse for ActionResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ResponseBody::Empty => Body::empty(),
            ResponseBody::Full(bytes) => Body::from(bytes),
            ResponseBody::Stream(stream) => Body::from_stream(stream),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// 控制器持有的响应句柄
///
/// 控制器可以在返回结果之前调整状态码或响应头，结果处理器随后在同一个响应上继续工作。
#[derive(Clone, Default)]
pub struct ResponseHandle {
    inner: Arc<Mutex<ActionResponse>>,
}

impl ResponseHandle {
    pub fn new(response: ActionResponse) -> Self {
        Self {
            inner: Arc::new(Mutex::new(response)),
        }
    }

    pub fn set_header(&self, name: &str, value: &str) -> Result<(), WebError> {
        self.inner.lock().set_header(name, value)
    }

    pub fn set_status(&self, status: StatusCode) {
        self.inner.lock().set_status(status);
    }

    /// 在锁内直接操作响应
    pub fn with<R>(&self, f: impl FnOnce(&mut ActionResponse) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// 取回响应；控制器仍持有克隆时取走其中的内容
    pub fn into_inner(self) -> ActionResponse {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().take(),
        }
    }
}
