//! # 管理服务器
//!
//! 内部端口上的 axum 服务：读写路由表与健康检查。当前不做认证，只应绑定在内部网络。

use axum::Router;
use axum::http::{Method, header};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ListenerConfig;
use crate::discovery::StaticDiscovery;
use crate::error::{ProxyError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use crate::proxy::route_table::RouteTable;
use crate::proxy::server::serve_router;

/// 管理服务器应用状态
#[derive(Clone)]
pub struct ManagementState {
    pub routes: Arc<RouteTable>,
    pub discovery: Arc<StaticDiscovery>,
    pub started_at: DateTime<Utc>,
}

impl ManagementState {
    #[must_use]
    pub fn new(routes: Arc<RouteTable>, discovery: Arc<StaticDiscovery>) -> Self {
        Self {
            routes,
            discovery,
            started_at: Utc::now(),
        }
    }
}

/// 管理服务器
pub struct ManagementServer {
    listener: ListenerConfig,
    router: Router,
}

impl ManagementServer {
    #[must_use]
    pub fn new(listener: ListenerConfig, state: ManagementState) -> Self {
        Self {
            listener,
            router: create_router(state),
        }
    }

    /// 绑定端口并服务，直到 `shutdown` 完成
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = self.listener.bind_address()?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            ProxyError::server_start_with_source(format!("管理端口绑定失败: {addr}"), e)
        })?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "management_server_start",
            &format!("Starting management server on {addr}")
        );

        serve_router(listener, self.router, shutdown).await
    }
}

/// 创建管理路由
pub fn create_router(state: ManagementState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
        .allow_origin(Any);

    super::routes::create_routes(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}
