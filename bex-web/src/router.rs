//! 路由绑定
//!
//! 把控制器集合按路由约定绑定为 Axum 路由。绑定顺序与控制器、路由键的声明顺序一致；
//! 路由键解析失败、方法不受支持、同一方法和路径重复绑定都会作为配置错误返回，
//! 不会等到 Axum 在运行时 panic。

use axum::{
    extract::Request,
    routing::{on, MethodFilter, MethodRouter},
    Router,
};
use bex_core::ServiceRegistry;
use std::collections::HashSet;
use std::sync::Arc;

use crate::controller::{ControllerLoader, ControllerSource, InventoryControllerLoader};
use crate::dispatch::DispatchHandler;
use crate::error::WebError;
use crate::registry::ResultRegistry;
use crate::routing::{parse_route, RouteInfo};
use crate::template::TemplateEngine;

/// 已绑定的路由
#[derive(Debug, Clone)]
pub struct BoundRoute {
    pub info: RouteInfo,
    pub controller: String,
    pub route_key: String,
    pub handler: DispatchHandler,
}

/// 路由绑定器
#[derive(Clone)]
pub struct RouterBinder {
    registry: Arc<ResultRegistry>,
    services: Arc<ServiceRegistry>,
    templates: Option<TemplateEngine>,
    loader: Arc<dyn ControllerLoader>,
}

impl std::fmt::Debug for RouterBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBinder")
            .field("registry", &self.registry)
            .field("templates", &self.templates)
            .finish_non_exhaustive()
    }
}

impl RouterBinder {
    pub fn new(registry: Arc<ResultRegistry>, services: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            services,
            templates: None,
            loader: Arc::new(InventoryControllerLoader),
        }
    }

    pub fn with_templates(mut self, templates: Option<TemplateEngine>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ControllerLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// 解析并绑定所有路由，不创建 Axum 路由
    pub fn bind(&self, source: ControllerSource) -> Result<Vec<BoundRoute>, WebError> {
        let controllers = match source {
            ControllerSource::Inline(controllers) => controllers,
            ControllerSource::Path(dir) => self.loader.load(&dir)?,
        };

        let mut routes = Vec::new();
        for (name, controller) in controllers {
            for (route_key, action) in controller.into_actions() {
                let info = parse_route(&name, &route_key)?;
                let handler = DispatchHandler::new(
                    action,
                    self.registry.clone(),
                    self.services.clone(),
                    self.templates.clone(),
                    info.clone(),
                );

                tracing::debug!(
                    controller = %name,
                    route_key = %route_key,
                    method = %info.method,
                    path = %info.path,
                    "Bound route"
                );

                routes.push(BoundRoute {
                    info,
                    controller: name.clone(),
                    route_key,
                    handler,
                });
            }
        }

        Ok(routes)
    }

    /// 创建 Axum 路由
    pub fn create_router(&self, source: ControllerSource) -> Result<Router, WebError> {
        let routes = self.bind(source)?;

        // 同一路径的不同方法必须合并到一个 MethodRouter 上
        let mut paths: Vec<(String, MethodRouter)> = Vec::new();
        let mut seen = HashSet::new();
        let mut matcher = matchit::Router::new();

        for route in routes {
            let path = mount_path(&route.info.path);
            let filter = method_filter(&route.info)?;

            if !seen.insert((route.info.method.clone(), path.clone())) {
                return Err(WebError::DuplicateRoute {
                    method: route.info.method.to_uppercase(),
                    path,
                });
            }

            let handler = route.handler;
            let method_router = on(filter, move |req: Request| handler.clone().handle(req));

            match paths.iter_mut().find(|(p, _)| *p == path) {
                Some((_, existing)) => {
                    let merged = std::mem::replace(existing, MethodRouter::new()).merge(method_router);
                    *existing = merged;
                }
                None => {
                    matcher.insert(path.as_str(), ()).map_err(|e| WebError::RouteConflict {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                    paths.push((path, method_router));
                }
            }
        }

        tracing::info!(routes = seen.len(), "Controller routes created");

        Ok(paths
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(&path, method_router)
            }))
    }
}

/// Axum 要求路径以 `/` 开头
fn mount_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn method_filter(info: &RouteInfo) -> Result<MethodFilter, WebError> {
    match info.method.as_str() {
        "get" => Ok(MethodFilter::GET),
        "post" => Ok(MethodFilter::POST),
        "put" => Ok(MethodFilter::PUT),
        "delete" => Ok(MethodFilter::DELETE),
        "patch" => Ok(MethodFilter::PATCH),
        "head" => Ok(MethodFilter::HEAD),
        "options" => Ok(MethodFilter::OPTIONS),
        "trace" => Ok(MethodFilter::TRACE),
        _ => Err(WebError::UnsupportedMethod {
            method: info.method.clone(),
            path: info.path.clone(),
        }),
    }
}
