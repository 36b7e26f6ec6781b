use bex_web::prelude::*;
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;

use crate::store::PostStore;

fn store(ctx: &ActionContext) -> anyhow::Result<Arc<PostStore>> {
    ctx.service::<PostStore>("posts")
        .ok_or_else(|| anyhow!("post store is not registered"))
}

fn post_id(params: &Params) -> anyhow::Result<u64> {
    params
        .get("id")
        .and_then(|id| id.as_str())
        .context("missing post id")?
        .parse()
        .context("post id must be a number")
}

fn text<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|value| value.as_str())
}

async fn list(ctx: ActionContext, params: Params, _req: Arc<ActionRequest>, _res: ResponseHandle) -> ActionOutput {
    let posts = store(&ctx)?.list();

    if text(&params, "format") == Some("json") {
        return Ok(Some(ctx.json(posts)?));
    }

    let title = ctx
        .service::<String>("title")
        .map(|t| t.to_string())
        .unwrap_or_else(|| "Blog".to_string());
    Ok(Some(ctx.view("my-blog/list", json!({ "title": title, "posts": posts }))?))
}

async fn view(ctx: ActionContext, params: Params, _req: Arc<ActionRequest>, _res: ResponseHandle) -> ActionOutput {
    let id = post_id(&params)?;

    match store(&ctx)?.get(id) {
        Some(post) => Ok(Some(ctx.view("my-blog/view", json!({ "post": post }))?)),
        None => Ok(None),
    }
}

async fn create(ctx: ActionContext, params: Params, _req: Arc<ActionRequest>, res: ResponseHandle) -> ActionOutput {
    let title = text(&params, "title").context("title is required")?;
    let post = store(&ctx)?.create(title, text(&params, "body").unwrap_or_default());

    tracing::info!(id = post.id, "Post created");
    res.set_status(StatusCode::CREATED);
    Ok(Some(ctx.json(post)?))
}

async fn update(ctx: ActionContext, params: Params, _req: Arc<ActionRequest>, _res: ResponseHandle) -> ActionOutput {
    let id = post_id(&params)?;
    let updated = store(&ctx)?.update(id, text(&params, "title"), text(&params, "body"));

    match updated {
        Some(post) => Ok(Some(ctx.json(post)?)),
        None => Ok(None),
    }
}

async fn remove(ctx: ActionContext, params: Params, _req: Arc<ActionRequest>, _res: ResponseHandle) -> ActionOutput {
    let id = post_id(&params)?;

    match store(&ctx)?.remove(id) {
        Some(_) => Ok(Some(ctx.empty()?)),
        None => Ok(None),
    }
}

async fn publish(ctx: ActionContext, params: Params, _req: Arc<ActionRequest>, _res: ResponseHandle) -> ActionOutput {
    let id = post_id(&params)?;

    match store(&ctx)?.publish(id) {
        Some(post) => Ok(Some(ctx.redirect(&format!("/my-blog/{}", post.id))?)),
        None => Ok(None),
    }
}

/// 以 Markdown 附件的形式导出
async fn export(ctx: ActionContext, params: Params, _req: Arc<ActionRequest>, _res: ResponseHandle) -> ActionOutput {
    let id = post_id(&params)?;
    let Some(post) = store(&ctx)?.get(id) else {
        return Ok(None);
    };

    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(format!("# {}\n\n", post.title))),
        Ok(Bytes::from(post.body)),
    ];
    let stream: ByteStream = Box::pin(futures_util::stream::iter(chunks));
    let disposition = format!("attachment; filename=\"post-{}.md\"", post.id);

    Ok(Some(ctx.stream(stream, Some("text/markdown; charset=utf-8"), Some(&disposition))?))
}

pub fn controller() -> Controller {
    Controller::new()
        .route("list", list)
        .route("view", view)
        .route("create", create)
        .route("update", update)
        .route("remove", remove)
        .route("POST &/:id/publish", publish)
        .route("GET &/:id/export", export)
}

submit_controller!("myBlog", controller);
