//! # Bex Web
//!
//! 基于 Axum 的约定式控制器框架
//!
//! ## 核心特性
//!
//! - **约定路由** - 路由键按约定解析为方法和路径，CRUD 动作无需写路径
//! - **结果分发** - 控制器返回结果描述，由可替换的结果处理器写入响应
//! - **统一失败处理** - 控制器的错误和 panic 都交给 `exception` 处理器
//! - **共享服务** - 服务注册表随请求上下文注入，不依赖全局变量
//! - **编译期收集** - `submit_controller!` 提交的控制器按目录自动加载

pub mod app;
pub mod constants;
pub mod context;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod middleware;
pub mod multipart;
pub mod registry;
pub mod request;
pub mod response;
pub mod result;
pub mod router;
pub mod routing;
pub mod server;
pub mod template;

// `submit_controller!` 展开时使用
pub use inventory;

pub use app::{AppUtils, BexApp, BexApplication};
pub use context::{build_context, ActionContext};
pub use controller::{
    Action, ActionOutput, Controller, ControllerLoader, ControllerSource, Controllers,
    InventoryControllerLoader,
};
pub use dispatch::DispatchHandler;
pub use error::{ErrorResponse, WebError};
pub use registry::{Outcome, RegistryKind, ResultHandler, ResultRegistry};
pub use request::{ActionRequest, ClientIp, CurrentUser, Params};
pub use response::{ActionResponse, ResponseHandle};
pub use result::{ActionResult, ByteStream, ResultArgs, ResultConstructor};
pub use router::{BoundRoute, RouterBinder};
pub use routing::{parse_route, RouteInfo};

pub mod prelude {
    //! 预导入模块

    pub use crate::app::*;
    pub use crate::context::*;
    pub use crate::controller::*;
    pub use crate::registry::{handler, Outcome, ResultHandler, ResultRegistry};
    pub use crate::request::*;
    pub use crate::response::*;
    pub use crate::result::{constructor, kinds, ActionResult, ByteStream, ResultArgs, ResultConstructor};
    pub use crate::routing::*;
    pub use crate::submit_controller;

    pub use bex_core::prelude::*;

    pub use axum;
    pub use axum::http::StatusCode;
    pub use axum::Router;
}
