//! 框架配置常量定义
//!
//! 定义所有框架使用的配置键名称

// ==================== Server 配置 ====================

/// 服务器监听地址
pub const SERVER_HOST: &str = "server.host";

/// 服务器监听端口
pub const SERVER_PORT: &str = "server.port";

/// 是否启用 CORS
pub const SERVER_ENABLE_CORS: &str = "server.enable-cors";

/// 是否启用请求日志
pub const SERVER_ENABLE_REQUEST_LOGGING: &str = "server.enable-request-logging";

// ==================== 约定目录 ====================

/// 应用根目录，控制器和视图目录由它推导
pub const BEX_BASEDIR: &str = "bex.basedir";

/// 控制器目录
pub const BEX_CONTROLLERS: &str = "bex.controllers";

/// 视图目录
pub const BEX_VIEWS: &str = "bex.views";

/// 视图文件扩展名（默认 html）
pub const BEX_VIEW_EXT: &str = "bex.view-ext";

// ==================== 请求处理 ====================

/// 是否信任 `X-Forwarded-For`
pub const BEX_TRUST_PROXY: &str = "bex.trust-proxy";

/// 请求体大小上限（字节）
pub const BEX_BODY_LIMIT: &str = "bex.body-limit";

/// Multipart 最大文件大小（字节）
pub const MULTIPART_MAX_FILE_SIZE: &str = "bex.multipart.max-file-size";

/// Multipart 最大字段数量
pub const MULTIPART_MAX_FIELDS: &str = "bex.multipart.max-fields";
