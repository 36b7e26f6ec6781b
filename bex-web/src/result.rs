//! 结果描述
//!
//! 控制器不直接写响应，而是返回一个 [`ActionResult`] 描述请求应当如何结束，
//! 再由注册表中同名的结果处理器把它翻译成对响应的操作。
//!
//! 内置的五种结果之外，应用可以在运行时注册新的结果种类，
//! 它们统一用 [`ActionResult::Custom`] 表示。

use bytes::Bytes;
use futures_util::Stream;
use serde_json::{Map, Value};
use std::pin::Pin;
use std::sync::Arc;

use crate::error::WebError;

/// 内置结果种类名称
pub mod kinds {
    pub const VIEW: &str = "view";
    pub const REDIRECT: &str = "redirect";
    pub const JSON: &str = "json";
    pub const EMPTY: &str = "empty";
    pub const STREAM: &str = "stream";
}

/// 发往客户端的字节流
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static>>;

/// 结果描述
///
/// 每个请求创建一次，分发时被移动给处理器消费，之后即被丢弃。
pub enum ActionResult {
    /// 渲染模板，`data` 缺省为空对象
    View { name: String, data: Map<String, Value> },
    Redirect { url: String },
    Json { payload: Value },
    /// 200 且没有响应体
    Empty,
    Stream {
        stream: ByteStream,
        content_type: Option<String>,
        content_disposition: Option<String>,
    },
    /// 运行时注册的结果种类
    Custom { kind: String, payload: Value },
}

impl ActionResult {
    /// 结果种类，分发时按它查找处理器
    pub fn kind(&self) -> &str {
        match self {
            ActionResult::View { .. } => kinds::VIEW,
            ActionResult::Redirect { .. } => kinds::REDIRECT,
            ActionResult::Json { .. } => kinds::JSON,
            ActionResult::Empty => kinds::EMPTY,
            ActionResult::Stream { .. } => kinds::STREAM,
            ActionResult::Custom { kind, .. } => kind,
        }
    }

    pub fn custom(kind: impl Into<String>, payload: Value) -> Self {
        ActionResult::Custom {
            kind: kind.into(),
            payload,
        }
    }
}

impl std::fmt::Debug for ActionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionResult::View { name, data } => f
                .debug_struct("View")
                .field("name", name)
                .field("data", data)
                .finish(),
            ActionResult::Redirect { url } => f.debug_struct("Redirect").field("url", url).finish(),
            ActionResult::Json { payload } => {
                f.debug_struct("Json").field("payload", payload).finish()
            }
            ActionResult::Empty => f.write_str("Empty"),
            ActionResult::Stream {
                content_type,
                content_disposition,
                ..
            } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .field("content_disposition", content_disposition)
                .finish_non_exhaustive(),
            ActionResult::Custom { kind, payload } => f
                .debug_struct("Custom")
                .field("kind", kind)
                .field("payload", payload)
                .finish(),
        }
    }
}

/// 结果构造器的参数
///
/// 位置参数统一为 JSON 值，流式结果额外携带一个字节流。
#[derive(Default)]
pub struct ResultArgs {
    values: Vec<Value>,
    stream: Option<ByteStream>,
}

impl ResultArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个位置参数
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn with_stream(mut self, stream: ByteStream) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// 取字符串参数，`null` 视为未提供
    pub fn str_at(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    pub fn take_stream(&mut self) -> Option<ByteStream> {
        self.stream.take()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Value>> for ResultArgs {
    fn from(values: Vec<Value>) -> Self {
        Self {
            values,
            stream: None,
        }
    }
}

/// 结果构造器
pub type ResultConstructor =
    Arc<dyn Fn(ResultArgs) -> Result<ActionResult, WebError> + Send + Sync>;

/// 把闭包包装成结果构造器
pub fn constructor<F>(f: F) -> ResultConstructor
where
    F: Fn(ResultArgs) -> Result<ActionResult, WebError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// `view(name, data?)`
pub fn view(args: ResultArgs) -> Result<ActionResult, WebError> {
    let name = args
        .str_at(0)
        .ok_or_else(|| WebError::invalid_args(kinds::VIEW, "view name must be a string"))?
        .to_string();

    let data = match args.get(1) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(data)) => data.clone(),
        Some(_) => {
            return Err(WebError::invalid_args(kinds::VIEW, "view data must be an object"));
        }
    };

    Ok(ActionResult::View { name, data })
}

/// `redirect(url)`
pub fn redirect(args: ResultArgs) -> Result<ActionResult, WebError> {
    let url = args
        .str_at(0)
        .ok_or_else(|| WebError::invalid_args(kinds::REDIRECT, "url must be a string"))?;

    Ok(ActionResult::Redirect {
        url: url.to_string(),
    })
}

/// `json(payload)`，缺省为 `null`
pub fn json(args: ResultArgs) -> Result<ActionResult, WebError> {
    Ok(ActionResult::Json {
        payload: args.get(0).cloned().unwrap_or(Value::Null),
    })
}

/// `empty()`
pub fn empty(_args: ResultArgs) -> Result<ActionResult, WebError> {
    Ok(ActionResult::Empty)
}

/// `stream(stream, content_type?, content_disposition?)`
pub fn stream(mut args: ResultArgs) -> Result<ActionResult, WebError> {
    let stream = args
        .take_stream()
        .ok_or_else(|| WebError::invalid_args(kinds::STREAM, "a byte stream is required"))?;

    Ok(ActionResult::Stream {
        stream,
        content_type: args.str_at(0).map(String::from),
        content_disposition: args.str_at(1).map(String::from),
    })
}

/// 内置结果构造器，按注册顺序排列
pub fn builtin_constructors() -> Vec<(String, ResultConstructor)> {
    vec![
        (kinds::VIEW.to_string(), constructor(view)),
        (kinds::REDIRECT.to_string(), constructor(redirect)),
        (kinds::EMPTY.to_string(), constructor(empty)),
        (kinds::JSON.to_string(), constructor(json)),
        (kinds::STREAM.to_string(), constructor(stream)),
    ]
}
