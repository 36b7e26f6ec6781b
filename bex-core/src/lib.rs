// bex-core: Bex 约定层的基础设施
//
// 提供 Web 层之外的公共能力：
// - 分层配置（TOML 文件、profile、环境变量、内存配置源）
// - 基于 tracing 的日志初始化
// - 命名约定工具（kebab-case 等）
// - 应用级共享服务注册表

pub mod config;
pub mod error;
pub mod logging;
pub mod naming;
pub mod services;

// 重新导出常用类型
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use error::{CoreError, CoreResult, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use services::ServiceRegistry;

/// Prelude 模块，包含常用的类型
pub mod prelude {
    pub use crate::config::{
        ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
        TomlPropertySource,
    };
    pub use crate::error::{CoreError, CoreResult, Result};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::naming;
    pub use crate::services::ServiceRegistry;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
