//! 应用启动
//!
//! [`BexApplication`] 把约定目录、结果注册表、服务注册表、模板引擎和中间件
//! 组装成一个 Axum 路由：
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     BexApplication::new("blog")
//!         .basedir("src")
//!         .before(|utils, router| {
//!             utils.register_service("db", Database::connect()?)?;
//!             Ok(router)
//!         })
//!         .run()
//!         .await
//! }
//! ```
//!
//! 没有在代码中设置的项从 [`Environment`] 读取，键名见 [`crate::constants`]。

use axum::{extract::DefaultBodyLimit, middleware, Extension, Router};
use bex_core::{Environment, LoggingConfig, ServiceRegistry};
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::constants::*;
use crate::controller::{ControllerLoader, ControllerSource};
use crate::error::WebError;
use crate::middleware::{client_ip, request_id, request_logging};
use crate::multipart::MultipartProperties;
use crate::registry::{ResultHandler, ResultRegistry};
use crate::result::ResultConstructor;
use crate::router::RouterBinder;
use crate::server::{serve, ServerProperties};
use crate::template::{TemplateEngine, TemplateProperties};

/// 默认请求体大小上限：2MB
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// 启动钩子
pub type Hook = Box<dyn FnOnce(&AppUtils, Router) -> anyhow::Result<Router> + Send>;

/// 可以显式设置、显式关闭或交给约定推导的设置项
#[derive(Debug, Clone)]
enum Setting<T> {
    Unset,
    Disabled,
    Set(T),
}

/// 提供给启动钩子的工具
#[derive(Debug, Clone)]
pub struct AppUtils {
    registry: Arc<ResultRegistry>,
    services: Arc<ServiceRegistry>,
    binder: RouterBinder,
}

impl AppUtils {
    pub fn registry(&self) -> &Arc<ResultRegistry> {
        &self.registry
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn register_result(
        &self,
        name: impl Into<String>,
        constructor: ResultConstructor,
        overwrite: bool,
    ) -> Result<(), WebError> {
        self.registry.register_result(name, constructor, overwrite)
    }

    pub fn register_handler(
        &self,
        name: impl Into<String>,
        handler: ResultHandler,
        overwrite: bool,
    ) -> Result<(), WebError> {
        self.registry.register_handler(name, handler, overwrite)
    }

    pub fn register_service<T>(&self, name: impl Into<String>, service: T) -> Result<(), WebError>
    where
        T: Any + Send + Sync,
    {
        Ok(self.services.register(name, service)?)
    }

    /// 用应用的注册表为额外的控制器创建路由
    pub fn create_router(&self, source: impl Into<ControllerSource>) -> Result<Router, WebError> {
        self.binder.create_router(source.into())
    }
}

/// 推导后的启动参数
#[derive(Debug, Clone)]
struct AppParams {
    controllers: Option<ControllerSource>,
    templates: TemplateProperties,
    trust_proxy: bool,
    body_limit: usize,
}

/// 构建完成的应用
#[derive(Debug)]
pub struct BexApp {
    pub router: Router,
    pub registry: Arc<ResultRegistry>,
    pub services: Arc<ServiceRegistry>,
    pub server: ServerProperties,
}

impl BexApp {
    pub fn into_router(self) -> Router {
        self.router
    }

    /// 启动服务器
    pub async fn run(self) -> anyhow::Result<()> {
        serve(self.router, &self.server).await
    }
}

/// 应用构建器
pub struct BexApplication {
    name: String,
    environment: Option<Arc<Environment>>,
    logging: Option<LoggingConfig>,
    basedir: Option<PathBuf>,
    controllers: Setting<ControllerSource>,
    views: Setting<PathBuf>,
    view_ext: Option<String>,
    template_engine: Option<TemplateEngine>,
    trust_proxy: Option<bool>,
    body_limit: Option<usize>,
    multipart: Option<MultipartProperties>,
    server: Option<ServerProperties>,
    registry: Option<Arc<ResultRegistry>>,
    services: Option<Arc<ServiceRegistry>>,
    loader: Option<Arc<dyn ControllerLoader>>,
    before: Option<Hook>,
    after: Option<Hook>,
}

impl std::fmt::Debug for BexApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BexApplication")
            .field("name", &self.name)
            .field("basedir", &self.basedir)
            .field("controllers", &self.controllers)
            .field("views", &self.views)
            .field("view_ext", &self.view_ext)
            .finish_non_exhaustive()
    }
}

impl BexApplication {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: None,
            logging: None,
            basedir: None,
            controllers: Setting::Unset,
            views: Setting::Unset,
            view_ext: None,
            template_engine: None,
            trust_proxy: None,
            body_limit: None,
            multipart: None,
            server: None,
            registry: None,
            services: None,
            loader: None,
            before: None,
            after: None,
        }
    }

    /// 配置来源，未设置时只使用默认值
    pub fn environment(mut self, environment: Arc<Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// 构建时初始化日志
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// 应用根目录，控制器和视图目录默认取它下面的 `controllers` 和 `views`
    pub fn basedir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.basedir = Some(dir.into());
        self
    }

    pub fn controllers(mut self, source: impl Into<ControllerSource>) -> Self {
        self.controllers = Setting::Set(source.into());
        self
    }

    /// 不挂载任何控制器，即使设置了 basedir
    pub fn disable_controllers(mut self) -> Self {
        self.controllers = Setting::Disabled;
        self
    }

    pub fn views(mut self, dir: impl Into<PathBuf>) -> Self {
        self.views = Setting::Set(dir.into());
        self
    }

    pub fn disable_views(mut self) -> Self {
        self.views = Setting::Disabled;
        self
    }

    /// 视图文件扩展名，默认 `html`
    pub fn view_ext(mut self, ext: impl Into<String>) -> Self {
        self.view_ext = Some(ext.into());
        self
    }

    /// 直接提供模板引擎，此时不再从视图目录加载
    pub fn template_engine(mut self, engine: TemplateEngine) -> Self {
        self.template_engine = Some(engine);
        self
    }

    /// 是否信任 `X-Forwarded-For`，默认信任
    pub fn trust_proxy(mut self, trust: bool) -> Self {
        self.trust_proxy = Some(trust);
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = Some(limit);
        self
    }

    pub fn multipart(mut self, properties: MultipartProperties) -> Self {
        self.multipart = Some(properties);
        self
    }

    pub fn server(mut self, properties: ServerProperties) -> Self {
        self.server = Some(properties);
        self
    }

    /// 使用外部创建的结果注册表
    pub fn registry(mut self, registry: Arc<ResultRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn services(mut self, services: Arc<ServiceRegistry>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn ControllerLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// 在挂载控制器路由和框架中间件之前执行
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&AppUtils, Router) -> anyhow::Result<Router> + Send + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    /// 在控制器路由挂载之后执行
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&AppUtils, Router) -> anyhow::Result<Router> + Send + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }

    /// 按约定推导控制器目录、视图目录和请求处理参数
    ///
    /// 显式设置优先，其次是配置项，最后由 basedir 推导。
    fn normalize_params(&self, env: &Environment) -> AppParams {
        let basedir = self
            .basedir
            .clone()
            .or_else(|| env.get_string(BEX_BASEDIR).map(PathBuf::from));

        let controllers = match &self.controllers {
            Setting::Set(source) => Some(source.clone()),
            Setting::Disabled => None,
            Setting::Unset => env
                .get_string(BEX_CONTROLLERS)
                .map(PathBuf::from)
                .or_else(|| basedir.as_ref().map(|dir| dir.join("controllers")))
                .map(ControllerSource::Path),
        };

        let views = match &self.views {
            Setting::Set(dir) => Some(dir.clone()),
            Setting::Disabled => None,
            Setting::Unset => env
                .get_string(BEX_VIEWS)
                .map(PathBuf::from)
                .or_else(|| basedir.as_ref().map(|dir| dir.join("views"))),
        };

        AppParams {
            controllers,
            templates: TemplateProperties {
                views,
                view_ext: self
                    .view_ext
                    .clone()
                    .unwrap_or_else(|| env.get_string_or(BEX_VIEW_EXT, "html")),
            },
            trust_proxy: self
                .trust_proxy
                .unwrap_or_else(|| env.get_bool_or(BEX_TRUST_PROXY, true)),
            body_limit: self.body_limit.unwrap_or_else(|| {
                env.get_i64(BEX_BODY_LIMIT)
                    .and_then(|limit| usize::try_from(limit).ok())
                    .unwrap_or(DEFAULT_BODY_LIMIT)
            }),
        }
    }

    fn build_templates(&mut self, props: &TemplateProperties) -> Result<Option<TemplateEngine>, WebError> {
        if let Some(engine) = self.template_engine.take() {
            return Ok(Some(engine));
        }

        let Some(views) = &props.views else {
            return Ok(None);
        };

        match TemplateEngine::new(views, &props.view_ext) {
            Ok(engine) => Ok(Some(engine)),
            // 由 basedir 推导出的视图目录允许不存在
            Err(e) if !matches!(self.views, Setting::Set(_)) && !views.is_dir() => {
                tracing::warn!(views = %views.display(), error = %e, "Views disabled");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 组装路由
    pub fn build(mut self) -> anyhow::Result<BexApp> {
        if let Some(logging) = self.logging.take() {
            logging.init()?;
        }

        let env = self.environment.clone().unwrap_or_default();
        let params = self.normalize_params(&env);
        let server = self
            .server
            .clone()
            .unwrap_or_else(|| ServerProperties::from_environment(&env));
        let mut multipart = self
            .multipart
            .clone()
            .unwrap_or_else(|| MultipartProperties::from_environment(&env));
        // multipart 直接读取请求体流，不经过 DefaultBodyLimit
        if multipart.max_request_size.is_none() {
            multipart.max_request_size = Some(params.body_limit);
        }

        let registry = self.registry.clone().unwrap_or_default();
        let services = self.services.clone().unwrap_or_default();
        let templates = self.build_templates(&params.templates)?;

        let mut binder = RouterBinder::new(registry.clone(), services.clone()).with_templates(templates);
        if let Some(loader) = self.loader.clone() {
            binder = binder.with_loader(loader);
        }

        let utils = AppUtils {
            registry: registry.clone(),
            services: services.clone(),
            binder: binder.clone(),
        };

        let mut router = Router::new();

        if let Some(before) = self.before.take() {
            router = before(&utils, router)?;
        }

        if let Some(source) = params.controllers.clone() {
            router = router.merge(binder.create_router(source)?);
        }

        if let Some(after) = self.after.take() {
            router = after(&utils, router)?;
        }

        router = router
            .layer(Extension(Arc::new(multipart)))
            .layer(DefaultBodyLimit::max(params.body_limit))
            .layer(middleware::from_fn_with_state(params.trust_proxy, client_ip))
            .layer(middleware::from_fn(request_id));

        if server.enable_request_logging {
            router = router.layer(middleware::from_fn(request_logging));
        }

        if server.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        tracing::info!(
            app = %self.name,
            controllers = ?params.controllers.as_ref().map(describe_source),
            views = ?params.templates.views,
            trust_proxy = params.trust_proxy,
            "Application built"
        );

        Ok(BexApp {
            router,
            registry,
            services,
            server,
        })
    }

    /// 构建并启动服务器
    pub async fn run(self) -> anyhow::Result<()> {
        self.build()?.run().await
    }
}

fn describe_source(source: &ControllerSource) -> String {
    match source {
        ControllerSource::Inline(controllers) => format!("{} inline", controllers.len()),
        ControllerSource::Path(dir) => dir.display().to_string(),
    }
}
