//! 控制器
//!
//! 每个文件通过 `submit_controller!` 提交一个控制器，启动时按 `controllers` 目录加载。

pub mod blog;
pub mod health;
