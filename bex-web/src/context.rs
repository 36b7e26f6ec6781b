//! 请求上下文
//!
//! 每个请求构建一个新的 [`ActionContext`]：当前用户、当时注册表中所有结果构造器的
//! 快照，以及共享服务。控制器通过它生成结果：
//!
//! ```ignore
//! async fn view(ctx: ActionContext, params: Params) -> ActionOutput {
//!     let post = load_post(&params)?;
//!     Ok(Some(ctx.view("blog/view", json!({ "post": post }))?))
//! }
//! ```

use bex_core::ServiceRegistry;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::WebError;
use crate::registry::ResultRegistry;
use crate::request::ActionRequest;
use crate::result::{kinds, ActionResult, ByteStream, ResultArgs, ResultConstructor};

/// 请求上下文
#[derive(Clone)]
pub struct ActionContext {
    user: Option<Value>,
    results: HashMap<String, ResultConstructor>,
    services: Arc<ServiceRegistry>,
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("user", &self.user)
            .field("results", &self.result_names())
            .finish_non_exhaustive()
    }
}

/// 为一次请求构建上下文
pub fn build_context(
    registry: &ResultRegistry,
    services: Arc<ServiceRegistry>,
    request: &ActionRequest,
) -> ActionContext {
    ActionContext {
        user: request.user.clone(),
        results: registry.result_constructors(),
        services,
    }
}

impl ActionContext {
    /// 当前用户，没有认证时为 `None`
    pub fn user(&self) -> Option<&Value> {
        self.user.as_ref()
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// 按名称和类型获取共享服务
    pub fn service<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.services.get(name)
    }

    /// 调用指定名称的结果构造器
    pub fn result(&self, name: &str, args: ResultArgs) -> Result<ActionResult, WebError> {
        let constructor = self.results.get(name).ok_or_else(|| WebError::UnknownResult {
            name: name.to_string(),
        })?;
        constructor(args)
    }

    pub fn has_result(&self, name: &str) -> bool {
        self.results.contains_key(name)
    }

    pub fn result_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.results.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// 渲染视图，`data` 为 `null` 时使用空对象
    pub fn view(&self, name: &str, data: Value) -> Result<ActionResult, WebError> {
        self.result(kinds::VIEW, ResultArgs::new().arg(name).arg(data))
    }

    pub fn redirect(&self, url: &str) -> Result<ActionResult, WebError> {
        self.result(kinds::REDIRECT, ResultArgs::new().arg(url))
    }

    pub fn json<T: Serialize>(&self, payload: T) -> Result<ActionResult, WebError> {
        let payload = serde_json::to_value(payload)?;
        self.result(kinds::JSON, ResultArgs::new().arg(payload))
    }

    pub fn empty(&self) -> Result<ActionResult, WebError> {
        self.result(kinds::EMPTY, ResultArgs::new())
    }

    pub fn stream(
        &self,
        stream: ByteStream,
        content_type: Option<&str>,
        content_disposition: Option<&str>,
    ) -> Result<ActionResult, WebError> {
        let args = ResultArgs::new()
            .arg(content_type)
            .arg(content_disposition)
            .with_stream(stream);
        self.result(kinds::STREAM, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::constructor;
    use serde_json::json;

    #[test]
    fn test_context_copies_user() {
        let registry = ResultRegistry::new();
        let services = Arc::new(ServiceRegistry::new());
        let request = ActionRequest::default().with_user(json!({ "name": "ann" }));

        let ctx = build_context(&registry, services, &request);
        assert_eq!(ctx.user(), Some(&json!({ "name": "ann" })));
    }

    #[test]
    fn test_contexts_are_independent() {
        let registry = ResultRegistry::new();
        let services = Arc::new(ServiceRegistry::new());

        let first = build_context(
            &registry,
            services.clone(),
            &ActionRequest::default().with_user(json!("ann")),
        );

        registry
            .register_result("csv", constructor(|_| Ok(ActionResult::Empty)), false)
            .unwrap();
        let second = build_context(&registry, services, &ActionRequest::default());

        assert_eq!(first.user(), Some(&json!("ann")));
        assert!(second.user().is_none());
        assert!(!first.has_result("csv"));
        assert!(second.has_result("csv"));
    }

    #[test]
    fn test_shorthands_go_through_table() {
        let registry = ResultRegistry::new();
        registry
            .register_result(
                "json",
                constructor(|args| {
                    Ok(ActionResult::custom(
                        "wrapped",
                        args.get(0).cloned().unwrap_or(Value::Null),
                    ))
                }),
                true,
            )
            .unwrap();

        let ctx = build_context(
            &registry,
            Arc::new(ServiceRegistry::new()),
            &ActionRequest::default(),
        );
        let result = ctx.json(json!({ "a": 1 })).unwrap();
        assert_eq!(result.kind(), "wrapped");
    }

    #[test]
    fn test_unknown_result() {
        let ctx = build_context(
            &ResultRegistry::empty(),
            Arc::new(ServiceRegistry::new()),
            &ActionRequest::default(),
        );
        let err = ctx.view("index", Value::Null).unwrap_err();
        assert!(matches!(err, WebError::UnknownResult { ref name } if name == "view"));
    }

    #[test]
    fn test_services_are_reachable() {
        let services = Arc::new(ServiceRegistry::new());
        services.register("site", String::from("bex blog")).unwrap();

        let ctx = build_context(&ResultRegistry::new(), services, &ActionRequest::default());
        assert_eq!(*ctx.service::<String>("site").unwrap(), "bex blog");
        assert_eq!(ctx.result_names(), vec!["empty", "json", "redirect", "stream", "view"]);
    }
}
