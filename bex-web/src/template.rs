//! 模板引擎支持
//!
//! 基于 Tera 渲染 `view` 结果。视图目录下所有带视图扩展名的文件在启动时加载，
//! 模板名相对于视图目录，可以省略扩展名：
//!
//! ```ignore
//! ctx.view("blog/list", json!({ "posts": posts }))
//! // 渲染 views/blog/list.html
//! ```

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::Tera;

/// 视图配置
///
/// 由应用启动时根据显式设置、配置项和 `bex.basedir` 推导。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateProperties {
    /// 视图目录，`None` 表示不启用模板
    pub views: Option<PathBuf>,

    /// 视图文件扩展名（默认 "html"）
    pub view_ext: String,
}

impl Default for TemplateProperties {
    fn default() -> Self {
        Self {
            views: None,
            view_ext: "html".to_string(),
        }
    }
}

/// 模板错误类型
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("No template engine configured, views are disabled")]
    EngineNotConfigured,

    #[error("Failed to render template '{template}': {cause}")]
    RenderError { template: String, cause: String },

    #[error("Template initialization error: {0}")]
    InitError(String),
}

/// 模板引擎
///
/// 克隆只复制引用，所有请求共享同一份已编译模板。
#[derive(Clone)]
pub struct TemplateEngine {
    tera: Arc<Tera>,
    ext: String,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("ext", &self.ext)
            .field("templates", &self.tera.get_template_names().count())
            .finish()
    }
}

impl TemplateEngine {
    /// 加载 `views_dir` 下所有 `*.{ext}` 模板
    pub fn new(views_dir: impl AsRef<Path>, ext: &str) -> Result<Self, TemplateError> {
        let views_dir = views_dir.as_ref();
        if !views_dir.is_dir() {
            return Err(TemplateError::InitError(format!(
                "Views directory '{}' does not exist",
                views_dir.display()
            )));
        }

        let ext = ext.trim_start_matches('.');
        let pattern = format!("{}/**/*.{}", views_dir.display(), ext);
        let tera = Tera::new(&pattern).map_err(|e| {
            TemplateError::InitError(format!(
                "Failed to initialize Tera with pattern '{}': {}",
                pattern, e
            ))
        })?;

        tracing::info!(
            pattern = %pattern,
            templates = tera.get_template_names().count(),
            "Template engine created"
        );

        Ok(Self {
            tera: Arc::new(tera),
            ext: ext.to_string(),
        })
    }

    /// 从内存中的模板源创建，模板名需要带扩展名
    pub fn from_raw_templates<'a, I>(templates: I, ext: &str) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| TemplateError::InitError(e.to_string()))?;

        Ok(Self {
            tera: Arc::new(tera),
            ext: ext.trim_start_matches('.').to_string(),
        })
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// 渲染模板，缺少扩展名时自动补上
    pub fn render(&self, name: &str, data: &Map<String, Value>) -> Result<String, TemplateError> {
        let template = self.resolve_name(name);
        let render_error = |cause: String| TemplateError::RenderError {
            template: template.clone(),
            cause,
        };

        let context = tera::Context::from_serialize(data).map_err(|e| render_error(e.to_string()))?;
        self.tera
            .render(&template, &context)
            .map_err(|e| render_error(tera_error_chain(&e)))
    }

    fn resolve_name(&self, name: &str) -> String {
        let name = name.trim_start_matches('/');
        let suffix = format!(".{}", self.ext);
        if name.ends_with(&suffix) {
            name.to_string()
        } else {
            format!("{}{}", name, suffix)
        }
    }
}

/// Tera 把真正的原因放在 source 链里
fn tera_error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> TemplateEngine {
        TemplateEngine::from_raw_templates(
            [
                ("hello.html", "Hello {{ name }}!"),
                ("blog/list.html", "{% for p in posts %}[{{ p }}]{% endfor %}"),
            ],
            "html",
        )
        .unwrap()
    }

    #[test]
    fn test_render_appends_extension() {
        let data = json!({ "name": "bex" });
        let html = engine().render("hello", data.as_object().unwrap()).unwrap();
        assert_eq!(html, "Hello bex!");

        let html = engine()
            .render("hello.html", data.as_object().unwrap())
            .unwrap();
        assert_eq!(html, "Hello bex!");
    }

    #[test]
    fn test_render_nested_template() {
        let data = json!({ "posts": ["a", "b"] });
        let html = engine().render("blog/list", data.as_object().unwrap()).unwrap();
        assert_eq!(html, "[a][b]");
    }

    #[test]
    fn test_render_missing_template() {
        let err = engine().render("nope", &Map::new()).unwrap_err();
        assert!(matches!(err, TemplateError::RenderError { ref template, .. } if template == "nope.html"));
    }

    #[test]
    fn test_missing_views_dir() {
        let err = TemplateEngine::new("/definitely/not/here", "html").unwrap_err();
        assert!(matches!(err, TemplateError::InitError(_)));
    }
}
