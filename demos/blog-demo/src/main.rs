//! Bex 博客示例
//!
//! 控制器放在 `src/controllers`，视图放在 `src/views`，两者都由 basedir 推导。
//!
//! ```text
//! GET    /my-blog            文章列表（?format=json 返回 JSON）
//! GET    /my-blog/:id        查看文章
//! POST   /my-blog            新建文章
//! PUT    /my-blog/:id        修改文章
//! DELETE /my-blog/:id        删除文章
//! POST   /my-blog/:id/publish
//! GET    /my-blog/:id/export
//! GET    /health
//! GET    /about              使用自定义的 text 结果
//! ```

mod controllers;
mod store;

use bex_web::prelude::*;
use bex_web::registry::Outcome;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use store::PostStore;

/// 纯文本结果，第一个参数是正文
fn text_result(args: ResultArgs) -> Result<ActionResult, bex_web::WebError> {
    let body = args.str_at(0).unwrap_or_default().to_string();
    Ok(ActionResult::custom("text", Value::String(body)))
}

fn text_handler(_req: &ActionRequest, res: &mut ActionResponse, outcome: Outcome) {
    let body = match outcome {
        Outcome::Result(ActionResult::Custom { payload, .. }) => match payload {
            Value::String(text) => text,
            other => other.to_string(),
        },
        _ => String::new(),
    };

    if let Err(e) = res.send_body("text/plain; charset=utf-8", body) {
        tracing::error!(error = %e, "Failed to write text result");
        res.end_with_status(StatusCode::INTERNAL_SERVER_ERROR);
    }
}

fn application(env: Arc<Environment>) -> BexApplication {
    let title = env.get_string_or("blog.title", "Blog");

    BexApplication::new("blog-demo")
        .environment(env)
        .basedir(Path::new(env!("CARGO_MANIFEST_DIR")).join("src"))
        .before(move |utils, router| {
            utils.register_service("posts", PostStore::with_samples())?;
            utils.register_service("title", title)?;
            utils.register_result("text", constructor(text_result), false)?;
            utils.register_handler("text", handler(text_handler), false)?;
            Ok(router)
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_file = format!("{}/application.toml", env!("CARGO_MANIFEST_DIR"));
    let env = Environment::load(&[config_file], "APP_", &[])?;

    application(Arc::new(env))
        .logging(LoggingConfig::from_env())
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::json;
    use tower::ServiceExt;

    fn router() -> Router {
        application(Arc::new(Environment::new()))
            .build()
            .unwrap()
            .into_router()
    }

    async fn send(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, axum::http::HeaderMap, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = router.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_list_as_json() {
        let (status, _, body) = send(router(), "GET", "/my-blog?format=json", None).await;
        assert_eq!(status, StatusCode::OK);

        let posts: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(posts.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_list_renders_view() {
        let (status, headers, body) = send(router(), "GET", "/my-blog", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert!(body.contains("Hello Bex"));
    }

    #[tokio::test]
    async fn test_create_and_missing_post() {
        let router = router();

        let (status, _, body) = send(
            router.clone(),
            "POST",
            "/my-blog",
            Some(json!({ "title": "New", "body": "text" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let post: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(post["id"], 3);

        let (status, _, _) = send(router, "GET", "/my-blog/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_without_title_goes_to_exception_handler() {
        let (status, _, _) = send(router(), "POST", "/my-blog", Some(json!({}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_publish_redirects() {
        let (status, headers, _) = send(router(), "POST", "/my-blog/1/publish", None).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[header::LOCATION], "/my-blog/1");
    }

    #[tokio::test]
    async fn test_export_streams_markdown() {
        let (status, headers, body) = send(router(), "GET", "/my-blog/1/export", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/markdown; charset=utf-8");
        assert!(body.starts_with("# Hello Bex"));
    }

    #[tokio::test]
    async fn test_custom_text_result() {
        let (status, headers, body) = send(router(), "GET", "/about", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert!(body.starts_with("Bex blog demo"));
    }
}
