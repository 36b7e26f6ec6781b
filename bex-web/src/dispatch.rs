//! 请求分发
//!
//! 每个绑定的路由对应一个 [`DispatchHandler`]。一次分发的步骤：
//!
//! 1. 构建请求上下文
//! 2. 合并参数
//! 3. 调用动作并等待它完成，panic 同样视为失败
//! 4. 成功时交给 `handle_result`，失败时交给 `handle_exception`，二者只执行其一

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bex_core::ServiceRegistry;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::context::build_context;
use crate::controller::Action;
use crate::registry::ResultRegistry;
use crate::request::ActionRequest;
use crate::response::{ActionResponse, ResponseHandle};
use crate::routing::RouteInfo;
use crate::template::TemplateEngine;

/// 单个路由的分发器
#[derive(Clone)]
pub struct DispatchHandler {
    action: Arc<dyn Action>,
    registry: Arc<ResultRegistry>,
    services: Arc<ServiceRegistry>,
    templates: Option<TemplateEngine>,
    route: Arc<RouteInfo>,
}

impl std::fmt::Debug for DispatchHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandler")
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

impl DispatchHandler {
    pub fn new(
        action: Arc<dyn Action>,
        registry: Arc<ResultRegistry>,
        services: Arc<ServiceRegistry>,
        templates: Option<TemplateEngine>,
        route: RouteInfo,
    ) -> Self {
        Self {
            action,
            registry,
            services,
            templates,
            route: Arc::new(route),
        }
    }

    pub fn route(&self) -> &RouteInfo {
        &self.route
    }

    /// 分发一个已经解析好的请求
    pub async fn dispatch(&self, request: ActionRequest) -> ActionResponse {
        let context = build_context(&self.registry, self.services.clone(), &request);
        let params = request.merged_params();
        let request = Arc::new(request);
        let handle = ResponseHandle::new(ActionResponse::new(self.templates.clone()));

        let outcome = AssertUnwindSafe(self.action.call(
            context,
            params,
            request.clone(),
            handle.clone(),
        ))
        .catch_unwind()
        .await;

        let mut response = handle.into_inner();
        let handled = match outcome {
            Ok(Ok(result)) => self.registry.handle_result(&request, &mut response, result),
            Ok(Err(error)) => self.registry.handle_exception(&request, &mut response, error),
            Err(panic) => {
                let error = anyhow::anyhow!("Action panicked: {}", panic_message(panic.as_ref()));
                self.registry.handle_exception(&request, &mut response, error)
            }
        };

        if let Err(e) = handled {
            tracing::error!(route = %self.route, error = %e, "Dispatch failed");
            response.end_with_status(StatusCode::INTERNAL_SERVER_ERROR);
        }

        response
    }

    /// Axum 适配：提取请求后分发，请求无法解析时直接返回错误响应
    pub async fn handle(self, req: Request) -> Response {
        match ActionRequest::extract(req).await {
            Ok(request) => self.dispatch(request).await.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
