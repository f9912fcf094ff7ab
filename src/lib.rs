//! # Partition Gateway Library
//!
//! 分区感知 API 网关核心库：可热替换的路由表、租户分区解析、带重试的上游代理。

pub mod auth;
pub mod config;
pub mod discovery;
pub mod dual_port_setup;
pub mod error;
pub mod logging;
pub mod management;
pub mod proxy;
pub mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{ProxyError, Result};
