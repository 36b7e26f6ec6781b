//! 请求来源
//!
//! [`ActionRequest`] 是控制器看到的请求：方法、URI、请求头、客户端地址、
//! 当前用户，以及已经解析好的查询参数、路径参数、请求体和上传文件。

use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, RawPathParams, Request},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    Form,
};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::WebError;
use crate::multipart::{read_multipart, MultipartProperties, UploadedFile};

/// 合并后的参数对象
pub type Params = Map<String, Value>;

/// 当前用户
///
/// 由认证层以请求扩展的形式写入，原样复制到请求和上下文中。
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser(pub Value);

/// 客户端地址，由 [`client_ip`](crate::middleware::client_ip) 中间件写入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// 控制器看到的请求
#[derive(Debug, Clone, Default)]
pub struct ActionRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub client_ip: Option<IpAddr>,
    pub user: Option<Value>,
    pub query: Params,
    pub params: Params,
    /// JSON、表单或 multipart 文本字段，没有请求体时为 `None`
    pub body: Option<Value>,
    pub files: Vec<UploadedFile>,
}

impl ActionRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: Value) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    /// 合并参数
    ///
    /// 优先级从低到高：上传文件元数据、查询参数、路径参数、请求体。
    /// 只有对象形式的请求体参与合并。
    pub fn merged_params(&self) -> Params {
        let mut merged = Params::new();

        for file in &self.files {
            let metadata = file.metadata();
            match merged.get_mut(&file.field_name) {
                Some(Value::Array(list)) => list.push(metadata),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, metadata]);
                }
                None => {
                    merged.insert(file.field_name.clone(), metadata);
                }
            }
        }

        merged.extend(self.query.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.extend(self.params.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(Value::Object(body)) = &self.body {
            merged.extend(body.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        merged
    }

    /// 从 Axum 请求中提取
    ///
    /// 请求体按 Content-Type 解析，解析失败返回 400，超过大小限制返回 413。
    pub async fn extract(req: Request) -> Result<Self, WebError> {
        let (mut parts, body) = req.into_parts();

        let params = match RawPathParams::from_request_parts(&mut parts, &()).await {
            Ok(raw) => raw
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
            Err(_) => Params::new(),
        };

        let query = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map(|Query(pairs)| into_params(pairs))
            .map_err(|e| WebError::FormParse {
                message: format!("Invalid query string: {}", e),
            })?;

        let user = parts.extensions.get::<CurrentUser>().map(|u| u.0.clone());
        let client_ip = parts.extensions.get::<ClientIp>().map(|ip| ip.0);
        let multipart_props = parts
            .extensions
            .get::<Arc<MultipartProperties>>()
            .cloned()
            .unwrap_or_default();

        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let mut request = ActionRequest {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            client_ip,
            user,
            query,
            params,
            body: None,
            files: Vec::new(),
        };

        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "application/json" => {
                let bytes = Bytes::from_request(Request::from_parts(parts, body), &())
                    .await
                    .map_err(|e| {
                        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                            WebError::PayloadTooLarge { message: e.body_text() }
                        } else {
                            WebError::JsonParse {
                                message: e.body_text(),
                                source: None,
                            }
                        }
                    })?;
                if !bytes.is_empty() {
                    let value = serde_json::from_slice(&bytes).map_err(|e| WebError::JsonParse {
                        message: e.to_string(),
                        source: Some(e),
                    })?;
                    request.body = Some(value);
                }
            }
            "application/x-www-form-urlencoded" => {
                let Form(pairs) =
                    Form::<Vec<(String, String)>>::from_request(Request::from_parts(parts, body), &())
                        .await
                        .map_err(|e| {
                            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                                WebError::PayloadTooLarge { message: e.body_text() }
                            } else {
                                WebError::FormParse { message: e.body_text() }
                            }
                        })?;
                request.body = Some(Value::Object(into_params(pairs)));
            }
            "multipart/form-data" => {
                let data = read_multipart(&content_type, body, &multipart_props).await?;
                request.body = Some(Value::Object(data.fields));
                request.files = data.files;
            }
            _ => {}
        }

        Ok(request)
    }
}

/// 键值对转参数对象，同名键后出现的覆盖先出现的
fn into_params(pairs: Vec<(String, String)>) -> Params {
    pairs
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde_json::json;

    fn upload(field: &str, name: &str) -> UploadedFile {
        UploadedFile {
            field_name: field.to_string(),
            filename: Some(name.to_string()),
            content_type: Some("text/plain".to_string()),
            data: Bytes::from_static(b"x"),
        }
    }

    #[test]
    fn test_merge_priority() {
        let request = ActionRequest::default()
            .with_file(upload("a", "a.txt"))
            .with_query("a", "query")
            .with_query("b", "query")
            .with_param("b", "param")
            .with_param("c", "param")
            .with_body(json!({ "c": "body", "d": 4 }));

        let merged = request.merged_params();
        assert_eq!(
            Value::Object(merged),
            json!({ "a": "query", "b": "param", "c": "body", "d": 4 })
        );
    }

    #[test]
    fn test_non_object_body_is_not_merged() {
        let request = ActionRequest::default()
            .with_query("page", "1")
            .with_body(json!([1, 2, 3]));

        assert_eq!(Value::Object(request.merged_params()), json!({ "page": "1" }));
    }

    #[test]
    fn test_repeated_file_fields_become_list() {
        let request = ActionRequest::default()
            .with_file(upload("docs", "a.txt"))
            .with_file(upload("docs", "b.txt"));

        let merged = request.merged_params();
        let docs = merged["docs"].as_array().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["originalName"], "b.txt");
    }

    #[tokio::test]
    async fn test_extract_json_body_and_query() {
        let mut req = Request::builder()
            .method("POST")
            .uri("/items?tag=new&tag=hot&page=2")
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(Body::from(r#"{"title":"Hello"}"#))
            .unwrap();
        req.extensions_mut().insert(CurrentUser(json!({ "id": 7 })));

        let request = ActionRequest::extract(req).await.unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.query["tag"], "hot");
        assert_eq!(request.query["page"], "2");
        assert_eq!(request.body, Some(json!({ "title": "Hello" })));
        assert_eq!(request.user, Some(json!({ "id": 7 })));
        assert!(request.params.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_json_body_keeps_status() {
        let payload = format!(r#"{{"text":"{}"}}"#, "x".repeat(3 * 1024 * 1024));
        let req = Request::builder()
            .method("POST")
            .uri("/items")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload))
            .unwrap();

        let err = ActionRequest::extract(req).await.unwrap_err();
        assert!(matches!(err, WebError::PayloadTooLarge { .. }));
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_extract_urlencoded_body() {
        let req = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("user=ann&remember=1"))
            .unwrap();

        let request = ActionRequest::extract(req).await.unwrap();
        assert_eq!(request.body, Some(json!({ "user": "ann", "remember": "1" })));
    }

    #[tokio::test]
    async fn test_extract_invalid_json_is_bad_request() {
        let req = Request::builder()
            .method("POST")
            .uri("/items")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let err = ActionRequest::extract(req).await.unwrap_err();
        assert!(matches!(err, WebError::JsonParse { .. }));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_extract_without_body() {
        let req = Request::builder()
            .uri("/items")
            .body(Body::empty())
            .unwrap();

        let request = ActionRequest::extract(req).await.unwrap();
        assert_eq!(request.body, None);
        assert!(request.user.is_none());
    }
}
