//! 中间件模块
//!
//! 请求日志、请求 ID 和客户端地址解析

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::{net::IpAddr, net::SocketAddr, time::Instant};

use crate::request::ClientIp;

static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// 请求日志中间件
pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        elapsed = ?start.elapsed(),
        "Request completed"
    );

    response
}

/// 请求 ID 中间件
///
/// 客户端已经带上 `X-Request-ID` 时沿用，否则生成一个新的。
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .cloned()
        .or_else(|| HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()).ok());

    let Some(request_id) = request_id else {
        return next.run(req).await;
    };

    req.headers_mut().insert(X_REQUEST_ID.clone(), request_id.clone());
    let mut response = next.run(req).await;
    response.headers_mut().insert(X_REQUEST_ID.clone(), request_id);
    response
}

/// 客户端地址中间件
///
/// `trust_proxy` 为 true 时取 `X-Forwarded-For` 中最左边的地址，
/// 否则（或请求头缺失时）使用连接的对端地址。
pub async fn client_ip(State(trust_proxy): State<bool>, mut req: Request, next: Next) -> Response {
    let forwarded = if trust_proxy {
        forwarded_for(&req)
    } else {
        None
    };

    let ip = forwarded.or_else(|| {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    });

    if let Some(ip) = ip {
        req.extensions_mut().insert(ClientIp(ip));
    }

    next.run(req).await
}

fn forwarded_for(req: &Request) -> Option<IpAddr> {
    req.headers()
        .get(&X_FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware::from_fn, middleware::from_fn_with_state, routing::get, Router};
    use tower::ServiceExt;

    async fn show_ip(req: Request) -> String {
        req.extensions()
            .get::<ClientIp>()
            .map(|ip| ip.0.to_string())
            .unwrap_or_else(|| "none".to_string())
    }

    async fn ip_for(trust_proxy: bool, forwarded: Option<&str>) -> String {
        let app = Router::new()
            .route("/", get(show_ip))
            .layer(from_fn_with_state(trust_proxy, client_ip));

        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(forwarded) = forwarded {
            builder = builder.header("X-Forwarded-For", forwarded);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));

        let response = app.oneshot(req).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_trusted_proxy_header() {
        assert_eq!(ip_for(true, Some("203.0.113.9, 10.0.0.2")).await, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_untrusted_proxy_header_is_ignored() {
        assert_eq!(ip_for(false, Some("203.0.113.9")).await, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_falls_back_to_socket_address() {
        assert_eq!(ip_for(true, None).await, "10.0.0.1");
        assert_eq!(ip_for(true, Some("garbage")).await, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn(request_id));

        let req = axum::http::Request::builder()
            .uri("/")
            .header("X-Request-ID", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");

        let req = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.headers()["x-request-id"].len(), 36);
    }
}
