//! 控制器支持
//!
//! 控制器是一组按路由键命名的动作。动作接收请求上下文、合并后的参数、
//! 请求和响应句柄，返回一个可选的结果描述：
//!
//! ```ignore
//! async fn list(ctx: ActionContext, params: Params, _req: Arc<ActionRequest>, _res: ResponseHandle) -> ActionOutput {
//!     Ok(Some(ctx.json(load_posts(&params)?)?))
//! }
//!
//! fn blog() -> Controller {
//!     Controller::new()
//!         .route("list", list)
//!         .route("POST &/:id/publish", publish)
//! }
//!
//! submit_controller!("myBlog", blog);
//! ```
//!
//! 通过 [`submit_controller!`](crate::submit_controller) 提交的控制器在编译期收集，
//! [`InventoryControllerLoader`] 按源文件所在目录把它们挑出来。

use futures_util::future::BoxFuture;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::context::ActionContext;
use crate::error::WebError;
use crate::request::{ActionRequest, Params};
use crate::response::ResponseHandle;
use crate::result::ActionResult;

/// 动作的返回值：`Ok(None)` 表示没有结果，交给 `undefined` 处理
pub type ActionOutput = anyhow::Result<Option<ActionResult>>;

/// 控制器动作
pub trait Action: Send + Sync + 'static {
    fn call(
        &self,
        ctx: ActionContext,
        params: Params,
        req: Arc<ActionRequest>,
        res: ResponseHandle,
    ) -> BoxFuture<'static, ActionOutput>;
}

impl<F, Fut> Action for F
where
    F: Fn(ActionContext, Params, Arc<ActionRequest>, ResponseHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionOutput> + Send + 'static,
{
    fn call(
        &self,
        ctx: ActionContext,
        params: Params,
        req: Arc<ActionRequest>,
        res: ResponseHandle,
    ) -> BoxFuture<'static, ActionOutput> {
        Box::pin(self(ctx, params, req, res))
    }
}

/// 控制器：按声明顺序排列的 `(路由键, 动作)`
#[derive(Clone, Default)]
pub struct Controller {
    actions: Vec<(String, Arc<dyn Action>)>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("routes", &self.route_keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加动作，路由键已存在时原位替换
    pub fn route<F, Fut>(self, route_key: impl Into<String>, action: F) -> Self
    where
        F: Fn(ActionContext, Params, Arc<ActionRequest>, ResponseHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionOutput> + Send + 'static,
    {
        self.route_action(route_key, Arc::new(action))
    }

    pub fn route_action(mut self, route_key: impl Into<String>, action: Arc<dyn Action>) -> Self {
        let route_key = route_key.into();
        match self.actions.iter_mut().find(|(key, _)| *key == route_key) {
            Some(entry) => entry.1 = action,
            None => self.actions.push((route_key, action)),
        }
        self
    }

    pub fn route_keys(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub(crate) fn into_actions(self) -> Vec<(String, Arc<dyn Action>)> {
        self.actions
    }
}

/// 控制器集合：按声明顺序排列的 `(控制器名, 控制器)`
#[derive(Clone, Debug, Default)]
pub struct Controllers {
    controllers: Vec<(String, Controller)>,
}

impl Controllers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加控制器，名称已存在时原位替换
    pub fn controller(mut self, name: impl Into<String>, controller: Controller) -> Self {
        let name = name.into();
        match self.controllers.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = controller,
            None => self.controllers.push((name, controller)),
        }
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.controllers.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

impl IntoIterator for Controllers {
    type Item = (String, Controller);
    type IntoIter = std::vec::IntoIter<(String, Controller)>;

    fn into_iter(self) -> Self::IntoIter {
        self.controllers.into_iter()
    }
}

/// 控制器来源
#[derive(Debug, Clone)]
pub enum ControllerSource {
    /// 直接提供的控制器集合
    Inline(Controllers),
    /// 控制器目录，由 [`ControllerLoader`] 解析
    Path(PathBuf),
}

impl ControllerSource {
    pub fn path(dir: impl Into<PathBuf>) -> Self {
        ControllerSource::Path(dir.into())
    }
}

impl From<Controllers> for ControllerSource {
    fn from(controllers: Controllers) -> Self {
        ControllerSource::Inline(controllers)
    }
}

/// 批量加载控制器
pub trait ControllerLoader: Send + Sync {
    /// 加载 `dir` 下的所有控制器，结果按控制器名排序
    fn load(&self, dir: &Path) -> Result<Controllers, WebError>;
}

/// 编译期提交的控制器
pub struct ControllerSubmission {
    /// 控制器名，路由中的 `&` 由它推导
    pub name: &'static str,
    /// 提交所在的源文件（`file!()`）
    pub source_file: &'static str,
    /// 提交所在 crate 的根目录（`CARGO_MANIFEST_DIR`），相对目录以它为基准
    pub manifest_dir: &'static str,
    pub build: fn() -> Controller,
}

impl ControllerSubmission {
    pub const fn new(
        name: &'static str,
        source_file: &'static str,
        manifest_dir: &'static str,
        build: fn() -> Controller,
    ) -> Self {
        Self {
            name,
            source_file,
            manifest_dir,
            build,
        }
    }

    /// 源文件是否位于 `dir` 之下
    ///
    /// 相对目录按提交所在 crate 的根目录解析，所以 `"src/controllers"` 只会
    /// 选中当前 crate 的控制器，不会选中依赖中同名目录下的控制器。
    pub fn is_under(&self, dir: &Path) -> bool {
        let dir = normalize(&Path::new(self.manifest_dir).join(dir));
        let source = self.source_path();
        source != dir && source.starts_with(&dir)
    }

    /// 源文件的绝对路径
    ///
    /// `file!()` 相对于工作空间根目录，它是 `manifest_dir` 的某个上级目录。
    fn source_path(&self) -> PathBuf {
        let manifest_dir = Path::new(self.manifest_dir);
        let mut roots: Vec<&Path> = manifest_dir.ancestors().collect();
        roots.reverse();

        roots
            .into_iter()
            .map(|root| normalize(&root.join(self.source_file)))
            .find(|candidate| candidate.starts_with(manifest_dir))
            .unwrap_or_else(|| normalize(Path::new(self.source_file)))
    }
}

inventory::collect!(ControllerSubmission);

/// 提交控制器
///
/// ```ignore
/// fn blog() -> Controller { Controller::new().route("list", list) }
///
/// submit_controller!("myBlog", blog);
/// ```
#[macro_export]
macro_rules! submit_controller {
    ($name:expr, $build:path) => {
        $crate::inventory::submit! {
            $crate::controller::ControllerSubmission::new($name, file!(), env!("CARGO_MANIFEST_DIR"), $build)
        }
    };
}

/// 从 `submit_controller!` 的提交中加载控制器
///
/// 只加载源文件位于 `dir` 之下的提交。相对的 `dir` 按各个提交所在 crate 的
/// `CARGO_MANIFEST_DIR` 解析，绝对路径原样比较。
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryControllerLoader;

impl ControllerLoader for InventoryControllerLoader {
    fn load(&self, dir: &Path) -> Result<Controllers, WebError> {
        let mut submissions: Vec<&ControllerSubmission> = inventory::iter::<ControllerSubmission>
            .into_iter()
            .filter(|submission| submission.is_under(dir))
            .collect();
        submissions.sort_by_key(|submission| submission.name);

        if let Some(pair) = submissions.windows(2).find(|pair| pair[0].name == pair[1].name) {
            return Err(WebError::DuplicateController {
                name: pair[0].name.to_string(),
            });
        }

        if submissions.is_empty() {
            tracing::warn!(dir = %dir.display(), "No controllers found");
        }

        let controllers = submissions
            .into_iter()
            .fold(Controllers::new(), |controllers, submission| {
                tracing::debug!(
                    controller = %submission.name,
                    file = %submission.source_file,
                    "Loaded controller"
                );
                controllers.controller(submission.name, (submission.build)())
            });

        Ok(controllers)
    }
}

/// 去掉 `.` 组件
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}
