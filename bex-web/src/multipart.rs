//! Multipart/form-data 支持
//!
//! 基于 multer 解析上传请求：文本字段并入请求体，文件字段成为
//! [`UploadedFile`]，随后以元数据的形式进入合并参数。

use axum::body::Body;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{constants::*, error::WebError};

/// Multipart 配置属性
///
/// 可通过配置文件的 `bex.multipart` 前缀配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartProperties {
    /// 单个字段最大大小（字节），默认 10MB
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// 最大字段数量，默认 100
    #[serde(default = "default_max_fields")]
    pub max_fields: usize,

    /// 整个请求体的最大大小（字节），应用启动时未设置则取 `bex.body-limit`
    #[serde(default)]
    pub max_request_size: Option<usize>,
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_max_fields() -> usize {
    100
}

impl Default for MultipartProperties {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_fields: default_max_fields(),
            max_request_size: None,
        }
    }
}

impl MultipartProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &bex_core::Environment) -> Self {
        Self {
            max_file_size: env
                .get_i64(MULTIPART_MAX_FILE_SIZE)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or_else(default_max_file_size),
            max_fields: env
                .get_i64(MULTIPART_MAX_FIELDS)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or_else(default_max_fields),
            max_request_size: None,
        }
    }

    fn to_multer_constraints(&self) -> multer::Constraints {
        let mut limit = multer::SizeLimit::new().per_field(self.max_file_size as u64);
        if let Some(max) = self.max_request_size {
            limit = limit.whole_stream(max as u64);
        }
        multer::Constraints::new().size_limit(limit)
    }
}

/// 上传的文件
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    /// 字段名称
    pub field_name: String,

    /// 原始文件名（如果提供）
    pub filename: Option<String>,

    /// 文件内容类型（如果提供）
    pub content_type: Option<String>,

    /// 文件数据
    pub data: Bytes,
}

impl UploadedFile {
    /// 获取文件大小（字节）
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 获取文件扩展名
    pub fn extension(&self) -> Option<&str> {
        self.filename
            .as_ref()
            .and_then(|name| name.rfind('.').map(|pos| &name[pos + 1..]))
    }

    /// 将文件数据保存到指定路径
    pub async fn save_to(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        tokio::fs::write(path, &self.data).await
    }

    /// 合并进参数对象时使用的描述，不包含文件内容
    pub fn metadata(&self) -> Value {
        json!({
            "fieldName": self.field_name,
            "originalName": self.filename,
            "mimeType": self.content_type,
            "size": self.size(),
        })
    }
}

/// 解析后的 multipart 请求体
#[derive(Debug, Default)]
pub struct MultipartData {
    /// 文本字段，同名字段后出现的覆盖先出现的
    pub fields: Map<String, Value>,

    /// 文件字段，保持上传顺序
    pub files: Vec<UploadedFile>,
}

/// 读取整个 multipart 请求体
pub async fn read_multipart(
    content_type: &str,
    body: Body,
    props: &MultipartProperties,
) -> Result<MultipartData, WebError> {
    let form_error = |message: String| WebError::FormParse { message };

    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| form_error(format!("Failed to parse boundary: {}", e)))?;

    let mut multipart = multer::Multipart::with_constraints(
        body.into_data_stream(),
        boundary,
        props.to_multer_constraints(),
    );

    let mut data = MultipartData::default();
    let mut count = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to read multipart field", e))?
    {
        count += 1;
        if count > props.max_fields {
            return Err(form_error(format!(
                "Too many multipart fields, at most {} allowed",
                props.max_fields
            )));
        }

        let field_name = field.name().unwrap_or("unknown").to_string();

        if field.file_name().is_some() {
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(|mime| mime.to_string());
            let bytes = field.bytes().await.map_err(|e| {
                multipart_error(&format!("Failed to read file field '{}'", field_name), e)
            })?;

            data.files.push(UploadedFile {
                field_name,
                filename,
                content_type,
                data: bytes,
            });
        } else {
            let value = field.text().await.map_err(|e| {
                multipart_error(&format!("Failed to read text field '{}'", field_name), e)
            })?;
            data.fields.insert(field_name, Value::String(value));
        }
    }

    Ok(data)
}

/// 超出大小限制的错误单独映射为 413
fn multipart_error(context: &str, err: multer::Error) -> WebError {
    match err {
        multer::Error::StreamSizeExceeded { limit } => WebError::PayloadTooLarge {
            message: format!("Multipart body exceeds {} bytes", limit),
        },
        multer::Error::FieldSizeExceeded { limit, field_name } => WebError::PayloadTooLarge {
            message: format!(
                "Field '{}' exceeds {} bytes",
                field_name.unwrap_or_default(),
                limit
            ),
        },
        other => WebError::FormParse {
            message: format!("{}: {}", context, other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "X-BEX-BOUNDARY";

    fn form_body() -> String {
        format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"title\"\r\n\r\n\
             Hello\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             PNGDATA\r\n\
             --{b}--\r\n",
            b = BOUNDARY
        )
    }

    fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    #[tokio::test]
    async fn test_read_fields_and_files() {
        let data = read_multipart(
            &content_type(),
            Body::from(form_body()),
            &MultipartProperties::default(),
        )
        .await
        .unwrap();

        assert_eq!(data.fields["title"], "Hello");
        assert_eq!(data.files.len(), 1);

        let file = &data.files[0];
        assert_eq!(file.field_name, "avatar");
        assert_eq!(file.extension(), Some("png"));
        assert_eq!(file.data, Bytes::from_static(b"PNGDATA"));
        assert_eq!(
            file.metadata(),
            json!({
                "fieldName": "avatar",
                "originalName": "me.png",
                "mimeType": "image/png",
                "size": 7,
            })
        );
    }

    #[tokio::test]
    async fn test_too_many_fields() {
        let props = MultipartProperties {
            max_fields: 1,
            ..Default::default()
        };
        let err = read_multipart(&content_type(), Body::from(form_body()), &props)
            .await
            .unwrap_err();
        assert!(matches!(err, WebError::FormParse { .. }));
    }

    fn upload_body(size: usize) -> String {
        format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"doc\"; filename=\"big.txt\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {data}\r\n\
             --{b}--\r\n",
            b = BOUNDARY,
            data = "x".repeat(size)
        )
    }

    #[tokio::test]
    async fn test_whole_body_limit() {
        let props = MultipartProperties {
            max_request_size: Some(1024),
            ..Default::default()
        };
        let err = read_multipart(&content_type(), Body::from(upload_body(64 * 1024)), &props)
            .await
            .unwrap_err();
        assert!(matches!(err, WebError::PayloadTooLarge { .. }));
        assert_eq!(err.status_code(), axum::http::StatusCode::PAYLOAD_TOO_LARGE);

        let data = read_multipart(&content_type(), Body::from(upload_body(100)), &props)
            .await
            .unwrap();
        assert_eq!(data.files[0].size(), 100);
    }

    #[tokio::test]
    async fn test_field_size_limit() {
        let props = MultipartProperties {
            max_file_size: 16,
            ..Default::default()
        };
        let err = read_multipart(&content_type(), Body::from(upload_body(64)), &props)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_missing_boundary() {
        let err = read_multipart("multipart/form-data", Body::empty(), &MultipartProperties::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
