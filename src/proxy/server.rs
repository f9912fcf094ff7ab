//! # 代理服务器
//!
//! 面向外部调用方的 axum 服务：所有路径都交给网关管线处理。

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, Response};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::config::{GatewayConfig, ListenerConfig};
use crate::error::{ProxyError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use crate::proxy::state::ProxyState;

/// 创建代理路由
pub fn create_router(state: ProxyState, gateway: &GatewayConfig) -> Router {
    let router = Router::new()
        .fallback(proxy_handler)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if gateway.enable_compression {
        router.layer(CompressionLayer::new().gzip(true))
    } else {
        router
    }
}

/// 代理入口
///
/// 处理器 future 被丢弃（调用方断开）时取消令牌随之触发。
async fn proxy_handler(State(state): State<ProxyState>, request: Request<Body>) -> Response<Body> {
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    state.handle(request, client_ip, &cancel).await
}

/// 代理服务器
pub struct ProxyServer {
    listener: ListenerConfig,
    router: Router,
}

impl ProxyServer {
    #[must_use]
    pub fn new(listener: ListenerConfig, state: ProxyState, gateway: &GatewayConfig) -> Self {
        Self {
            listener,
            router: create_router(state, gateway),
        }
    }

    /// 绑定端口并服务，直到 `shutdown` 完成
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = self.listener.bind_address()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::server_start_with_source(format!("代理端口绑定失败: {addr}"), e))?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "proxy_server_start",
            &format!("Starting proxy server on {addr}")
        );

        serve_router(listener, self.router, shutdown).await
    }
}

/// 在已绑定的监听器上服务路由，携带客户端地址
pub async fn serve_router(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| ProxyError::server_start_with_source("HTTP 服务异常退出", e))
}
