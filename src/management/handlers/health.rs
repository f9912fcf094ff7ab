//! 健康检查处理器

use axum::extract::State;
use axum::response::Response;
use serde::Serialize;

use crate::management::response;
use crate::management::server::ManagementState;

/// 健康状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub routes: usize,
    pub services: usize,
    pub discovery_version: u64,
    pub uptime_seconds: i64,
}

/// 健康检查
pub async fn health_check(State(state): State<ManagementState>) -> Response {
    response::success(HealthStatus {
        status: "healthy",
        routes: state.routes.snapshot().len(),
        services: state.discovery.service_count(),
        discovery_version: state.discovery.version(),
        uptime_seconds: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}
