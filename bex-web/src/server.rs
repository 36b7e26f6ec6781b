//! Web 服务器模块
//!
//! 基于 Axum 的 Web 服务器实现

use axum::Router;
use bex_core::Environment;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::constants::*;

/// Web 服务器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 是否启用 CORS
    pub enable_cors: bool,

    /// 是否启用请求日志
    pub enable_request_logging: bool,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: false,
            enable_request_logging: true,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            host: env.get_string(SERVER_HOST).unwrap_or(defaults.host),
            port: env
                .get_i64(SERVER_PORT)
                .and_then(|port| u16::try_from(port).ok())
                .unwrap_or(defaults.port),
            enable_cors: env.get_bool_or(SERVER_ENABLE_CORS, defaults.enable_cors),
            enable_request_logging: env
                .get_bool_or(SERVER_ENABLE_REQUEST_LOGGING, defaults.enable_request_logging),
        }
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 启动服务器，直到进程退出
///
/// 对端地址通过 `ConnectInfo` 提供给客户端地址中间件。
pub async fn serve(router: Router, properties: &ServerProperties) -> anyhow::Result<()> {
    let addr = properties.address();

    tracing::info!("🚀 Starting Bex server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!("✅ Server listening on http://{}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bex_core::{ConfigValue, MapPropertySource};

    #[test]
    fn test_defaults_without_config() {
        let props = ServerProperties::from_environment(&Environment::new());
        assert_eq!(props, ServerProperties::default());
        assert_eq!(props.address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_from_environment() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test")
                .with_property(SERVER_HOST, ConfigValue::String("127.0.0.1".into()))
                .with_property(SERVER_PORT, ConfigValue::Int(3000))
                .with_property(SERVER_ENABLE_CORS, ConfigValue::Bool(true)),
        ));

        let props = ServerProperties::from_environment(&env);
        assert_eq!(props.address(), "127.0.0.1:3000");
        assert!(props.enable_cors);
        assert!(props.enable_request_logging);
    }

    #[test]
    fn test_out_of_range_port_falls_back() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test").with_property(SERVER_PORT, ConfigValue::Int(70000)),
        ));
        assert_eq!(ServerProperties::from_environment(&env).port, 8080);
    }
}
