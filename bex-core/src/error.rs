/// 应用层统一的错误类型
///
/// 业务代码与启动钩子使用 `anyhow::Result`，通过 `.context()` 补充上下文。
/// 框架自身可以枚举的失败则使用下面的 [`CoreError`]。
pub use anyhow::Result;

use thiserror::Error;

/// bex-core 的错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    /// 同名服务已经注册
    #[error("Service \"{name}\" already registered")]
    DuplicateService { name: String },

    /// 配置文件读取或解析失败
    #[error("Configuration error: {0}")]
    Config(String),

    /// 日志系统初始化失败（通常是全局 subscriber 已经被设置）
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
