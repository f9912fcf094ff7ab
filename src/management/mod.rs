//! # 管理模块
//!
//! 内部端口上的路由表读写与健康检查接口

pub mod handlers;
pub mod response;
pub mod routes;
pub mod server;

pub use server::{ManagementServer, ManagementState};
