//! 结果注册表
//!
//! 两张按名称索引的表：
//!
//! - **结果构造器**：控制器通过上下文调用，生成 [`ActionResult`]
//! - **结果处理器**：分发结束时按结果种类查找，把结果写进响应
//!
//! 两张表的注册规则相同：名称已存在且没有要求覆盖时拒绝注册。
//! 处理器表保留两个名称：`exception` 接收控制器的错误，`undefined` 兜底处理
//! 没有结果或结果种类未注册的情况。
//!
//! 注册表属于某个应用实例，通过 `Arc` 在路由和请求之间共享。

use axum::http::{header, StatusCode};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::WebError;
use crate::request::ActionRequest;
use crate::response::ActionResponse;
use crate::result::{builtin_constructors, kinds, ActionResult, ResultConstructor};

/// 控制器出错时调用的处理器名称
pub const EXCEPTION_HANDLER: &str = "exception";

/// 没有可用处理器时调用的处理器名称
pub const UNDEFINED_HANDLER: &str = "undefined";

/// 注册表中的两类条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Result,
    Handler,
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryKind::Result => f.write_str("result"),
            RegistryKind::Handler => f.write_str("handler"),
        }
    }
}

/// 交给处理器的分发结果
#[derive(Debug)]
pub enum Outcome {
    /// 控制器返回的结果
    Result(ActionResult),
    /// 控制器没有返回结果
    Missing,
    /// 控制器失败，错误原样传递
    Exception(anyhow::Error),
}

/// 结果处理器
pub type ResultHandler = Arc<dyn Fn(&ActionRequest, &mut ActionResponse, Outcome) + Send + Sync>;

/// 把闭包包装成结果处理器
pub fn handler<F>(f: F) -> ResultHandler
where
    F: Fn(&ActionRequest, &mut ActionResponse, Outcome) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 结果注册表
pub struct ResultRegistry {
    results: RwLock<HashMap<String, ResultConstructor>>,
    handlers: RwLock<HashMap<String, ResultHandler>>,
}

impl Default for ResultRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResultRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut results: Vec<String> = self.results.read().keys().cloned().collect();
        let mut handlers: Vec<String> = self.handlers.read().keys().cloned().collect();
        results.sort();
        handlers.sort();

        f.debug_struct("ResultRegistry")
            .field("results", &results)
            .field("handlers", &handlers)
            .finish()
    }
}

impl ResultRegistry {
    /// 创建注册表并安装内置的构造器和处理器
    pub fn new() -> Self {
        let registry = Self::empty();
        registry
            .results
            .write()
            .extend(builtin_constructors());
        registry
            .handlers
            .write()
            .extend(builtin_handlers());
        registry
    }

    /// 创建空注册表
    pub fn empty() -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_result(
        &self,
        name: impl Into<String>,
        constructor: ResultConstructor,
        overwrite: bool,
    ) -> Result<(), WebError> {
        self.register_results([(name.into(), constructor)], overwrite)
    }

    /// 批量注册结果构造器
    ///
    /// 按顺序逐个处理，遇到冲突立即返回错误，之前的条目保持已注册状态。
    pub fn register_results<I>(&self, entries: I, overwrite: bool) -> Result<(), WebError>
    where
        I: IntoIterator<Item = (String, ResultConstructor)>,
    {
        register_into(&self.results, RegistryKind::Result, entries, overwrite)
    }

    pub fn register_handler(
        &self,
        name: impl Into<String>,
        handler: ResultHandler,
        overwrite: bool,
    ) -> Result<(), WebError> {
        self.register_handlers([(name.into(), handler)], overwrite)
    }

    /// 批量注册结果处理器，规则同 [`register_results`](Self::register_results)
    pub fn register_handlers<I>(&self, entries: I, overwrite: bool) -> Result<(), WebError>
    where
        I: IntoIterator<Item = (String, ResultHandler)>,
    {
        register_into(&self.handlers, RegistryKind::Handler, entries, overwrite)
    }

    pub fn has_result(&self, name: &str) -> bool {
        self.results.read().contains_key(name)
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// 当前所有结果构造器的快照
    pub fn result_constructors(&self) -> HashMap<String, ResultConstructor> {
        self.results.read().clone()
    }

    /// 把控制器返回的结果交给对应的处理器
    ///
    /// 没有结果或结果种类没有注册处理器时交给 `undefined`。
    pub fn handle_result(
        &self,
        req: &ActionRequest,
        res: &mut ActionResponse,
        result: Option<ActionResult>,
    ) -> Result<(), WebError> {
        let (handler, outcome) = {
            let handlers = self.handlers.read();
            match result {
                Some(result) => match handlers.get(result.kind()) {
                    Some(handler) => (Some(handler.clone()), Outcome::Result(result)),
                    None => {
                        tracing::debug!(kind = %result.kind(), "No handler for result kind");
                        (handlers.get(UNDEFINED_HANDLER).cloned(), Outcome::Result(result))
                    }
                },
                None => (handlers.get(UNDEFINED_HANDLER).cloned(), Outcome::Missing),
            }
        };

        let handler = handler.ok_or_else(|| WebError::MissingHandler {
            name: UNDEFINED_HANDLER.to_string(),
        })?;
        handler(req, res, outcome);
        Ok(())
    }

    /// 把控制器的错误交给 `exception` 处理器
    pub fn handle_exception(
        &self,
        req: &ActionRequest,
        res: &mut ActionResponse,
        error: anyhow::Error,
    ) -> Result<(), WebError> {
        let handler = self
            .handlers
            .read()
            .get(EXCEPTION_HANDLER)
            .cloned()
            .ok_or_else(|| WebError::MissingHandler {
                name: EXCEPTION_HANDLER.to_string(),
            })?;

        handler(req, res, Outcome::Exception(error));
        Ok(())
    }
}

fn register_into<T, I>(
    table: &RwLock<HashMap<String, T>>,
    kind: RegistryKind,
    entries: I,
    overwrite: bool,
) -> Result<(), WebError>
where
    I: IntoIterator<Item = (String, T)>,
{
    let mut table = table.write();
    for (name, entry) in entries {
        if !overwrite && table.contains_key(&name) {
            return Err(WebError::DuplicateRegistration { kind, name });
        }
        tracing::debug!(%kind, name = %name, "Registering");
        table.insert(name, entry);
    }
    Ok(())
}

// ==================== 内置处理器 ====================

fn builtin_handlers() -> Vec<(String, ResultHandler)> {
    vec![
        (kinds::VIEW.to_string(), handler(handle_view)),
        (kinds::REDIRECT.to_string(), handler(handle_redirect)),
        (kinds::EMPTY.to_string(), handler(handle_empty)),
        (kinds::JSON.to_string(), handler(handle_json)),
        (kinds::STREAM.to_string(), handler(handle_stream)),
        (EXCEPTION_HANDLER.to_string(), handler(handle_exception)),
        (UNDEFINED_HANDLER.to_string(), handler(handle_undefined)),
    ]
}

/// 处理器收到了不属于自己的结果
fn mismatched(req: &ActionRequest, res: &mut ActionResponse, expected: &str, outcome: &Outcome) {
    tracing::warn!(
        method = %req.method,
        path = %req.uri.path(),
        expected = %expected,
        outcome = ?outcome,
        "Result handler received an unexpected outcome"
    );
    res.end_with_status(StatusCode::INTERNAL_SERVER_ERROR);
}

fn fail(req: &ActionRequest, res: &mut ActionResponse, kind: &str, error: WebError) {
    tracing::error!(
        method = %req.method,
        path = %req.uri.path(),
        kind = %kind,
        error = %error,
        "Failed to write result"
    );
    res.end_with_status(StatusCode::INTERNAL_SERVER_ERROR);
}

fn handle_view(req: &ActionRequest, res: &mut ActionResponse, outcome: Outcome) {
    match outcome {
        Outcome::Result(ActionResult::View { name, data }) => {
            if let Err(e) = res.render(&name, &data) {
                fail(req, res, kinds::VIEW, e);
            }
        }
        other => mismatched(req, res, kinds::VIEW, &other),
    }
}

fn handle_redirect(req: &ActionRequest, res: &mut ActionResponse, outcome: Outcome) {
    match outcome {
        Outcome::Result(ActionResult::Redirect { url }) => {
            if let Err(e) = res.redirect(&url) {
                fail(req, res, kinds::REDIRECT, e);
            }
        }
        other => mismatched(req, res, kinds::REDIRECT, &other),
    }
}

fn handle_json(req: &ActionRequest, res: &mut ActionResponse, outcome: Outcome) {
    match outcome {
        Outcome::Result(ActionResult::Json { payload }) => {
            if let Err(e) = res.send_json(&payload) {
                fail(req, res, kinds::JSON, e);
            }
        }
        other => mismatched(req, res, kinds::JSON, &other),
    }
}

fn handle_empty(_req: &ActionRequest, res: &mut ActionResponse, _outcome: Outcome) {
    res.end_with_status(StatusCode::OK);
}

fn handle_stream(req: &ActionRequest, res: &mut ActionResponse, outcome: Outcome) {
    match outcome {
        Outcome::Result(ActionResult::Stream {
            stream,
            content_type,
            content_disposition,
        }) => {
            let headers = [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_DISPOSITION, content_disposition),
            ];
            for (name, value) in headers {
                let Some(value) = value else { continue };
                if let Err(e) = res.set_header(name.as_str(), &value) {
                    fail(req, res, kinds::STREAM, e);
                    return;
                }
            }
            res.pipe_stream(stream);
        }
        other => mismatched(req, res, kinds::STREAM, &other),
    }
}

fn handle_exception(req: &ActionRequest, res: &mut ActionResponse, outcome: Outcome) {
    match outcome {
        Outcome::Exception(error) => {
            tracing::error!(
                method = %req.method,
                path = %req.uri.path(),
                error = ?error,
                "Action failed"
            );
        }
        other => {
            tracing::error!(outcome = ?other, "Exception handler invoked without an error");
        }
    }
    res.end_with_status(StatusCode::INTERNAL_SERVER_ERROR);
}

fn handle_undefined(_req: &ActionRequest, res: &mut ActionResponse, _outcome: Outcome) {
    res.end_with_status(StatusCode::NOT_FOUND);
}
