//! # 路由配置

use axum::Router;
use axum::routing::get;

use crate::management::handlers::{health, routes};
use crate::management::server::ManagementState;

/// 创建所有管理路由
pub fn create_routes(state: ManagementState) -> Router {
    Router::new()
        .route("/route", get(routes::get_routes).post(routes::replace_routes))
        .route("/health", get(health::health_check))
        .with_state(state)
}
