use bex_web::prelude::*;
use serde_json::json;
use std::sync::Arc;

async fn health(ctx: ActionContext, _params: Params, _req: Arc<ActionRequest>, _res: ResponseHandle) -> ActionOutput {
    Ok(Some(ctx.json(json!({
        "status": "UP",
        "time": chrono::Utc::now().to_rfc3339(),
    }))?))
}

async fn about(ctx: ActionContext, _params: Params, req: Arc<ActionRequest>, _res: ResponseHandle) -> ActionOutput {
    let visitor = req
        .client_ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let result = ctx.result(
        "text",
        ResultArgs::new().arg(format!("Bex blog demo, you are visiting from {}", visitor)),
    )?;
    Ok(Some(result))
}

pub fn controller() -> Controller {
    Controller::new()
        .route("/health", health)
        .route("GET /about", about)
}

submit_controller!("health", controller);
