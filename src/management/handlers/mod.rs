//! # 管理接口处理器

pub mod health;
pub mod routes;
