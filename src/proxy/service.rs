//! # 网关请求管线
//!
//! 每个入站请求：认证 → 准入校验 → 读取请求体 → 分区解析 → 重试代理 → 响应回写。
//! 准入失败直接返回对应状态码（空响应体），不调用上游。

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::auth::{Authenticator, TenantResolver};
use crate::config::GatewayConfig;
use crate::error::{ErrorCategory, ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::proxy::endpoint_resolver::{EndpointResolver, PartitionDiscovery};
use crate::proxy::executor::RetryingProxyExecutor;
use crate::proxy::headers::HeaderRewriter;
use crate::proxy::request::{InboundRequest, request_id_from};
use crate::proxy::response::ResponseRelay;
use crate::proxy::retry_policy::RetryPolicy;
use crate::proxy::route_table::RouteTable;
use crate::proxy::route_validator::{RouteValidator, ValidationResult};
use crate::proxy::upstream::UpstreamClient;
use crate::{ldebug, lerror, linfo, lwarn};

/// 网关依赖的协作方
#[derive(Clone)]
pub struct GatewayCollaborators {
    pub routes: Arc<RouteTable>,
    pub discovery: Arc<dyn PartitionDiscovery>,
    pub client: Arc<dyn UpstreamClient>,
    pub authenticator: Arc<dyn Authenticator>,
    pub tenant_resolver: Arc<dyn TenantResolver>,
}

/// 网关服务
pub struct GatewayService {
    authenticator: Arc<dyn Authenticator>,
    validator: RouteValidator,
    resolver: Arc<EndpointResolver>,
    executor: RetryingProxyExecutor,
    relay: ResponseRelay,
    path_base: Option<String>,
    max_body_bytes: usize,
}

impl GatewayService {
    #[must_use]
    pub fn new(
        collaborators: GatewayCollaborators,
        gateway: &GatewayConfig,
        policy: RetryPolicy,
    ) -> Self {
        let GatewayCollaborators {
            routes,
            discovery,
            client,
            authenticator,
            tenant_resolver,
        } = collaborators;

        let rewriter = HeaderRewriter::new(gateway.host_name.clone());
        let resolver = Arc::new(EndpointResolver::new(discovery));

        Self {
            authenticator,
            validator: RouteValidator::new(routes, tenant_resolver),
            executor: RetryingProxyExecutor::new(
                client,
                Arc::clone(&resolver),
                rewriter.clone(),
                policy,
            ),
            resolver,
            relay: ResponseRelay::new(rewriter),
            path_base: gateway.path_base.clone(),
            max_body_bytes: gateway.max_body_bytes,
        }
    }

    /// 处理一个入站请求，总是产生响应
    pub async fn handle(
        &self,
        request: Request<Body>,
        client_ip: Option<IpAddr>,
        cancel: &CancellationToken,
    ) -> Response<Body> {
        let request_id = request_id_from(request.headers());
        match self.proxy(request, &request_id, client_ip, cancel).await {
            Ok(response) => response,
            Err(error) => {
                log_failure(&request_id, &error);
                error.into_response()
            }
        }
    }

    async fn proxy(
        &self,
        request: Request<Body>,
        request_id: &str,
        client_ip: Option<IpAddr>,
        cancel: &CancellationToken,
    ) -> Result<Response<Body>> {
        let (parts, body) = request.into_parts();
        let mut inbound = InboundRequest::from_parts(
            parts,
            request_id.to_string(),
            client_ip,
            self.path_base.as_deref(),
        );

        linfo!(
            request_id,
            LogStage::RequestStart,
            LogComponent::Gateway,
            "request_received",
            "收到代理请求",
            method = %inbound.method,
            path = %inbound.path,
            client_ip = ?inbound.client_ip
        );

        // 准入只看请求头部，未准入的请求不读取请求体
        let principal = self.authenticator.authenticate(&inbound.headers);
        let (identity, route) = match self.validator.validate(&inbound, principal.as_ref()).await? {
            ValidationResult::Success { identity, route } => (identity, route),
            ValidationResult::Failure(admission) => {
                return Ok(admission.status_code().into_response());
            }
        };

        inbound.read_body(body, self.max_body_bytes, cancel).await?;

        let selector = self.resolver.selector_for(&route, &identity);
        ldebug!(
            request_id,
            LogStage::Admission,
            LogComponent::Gateway,
            "request_admitted",
            "请求已准入",
            route = %route,
            selector = %selector,
            correlation_id = %route.correlation_id,
            authenticated = principal.is_some(),
            body_bytes = inbound.body.as_ref().map_or(0, bytes::Bytes::len)
        );

        let partition = self
            .resolver
            .resolve(request_id, &route.service_uri, selector, cancel)
            .await?;
        let outcome = self
            .executor
            .execute(&inbound, &identity, &route, partition, cancel)
            .await?;

        self.relay.relay(request_id, outcome.response)
    }
}

fn log_failure(request_id: &str, error: &ProxyError) {
    let (status, code) = error.to_http_response_parts();
    if error.is_cancelled() {
        ldebug!(
            request_id,
            LogStage::RequestStart,
            LogComponent::Gateway,
            "request_cancelled",
            "调用方已断开",
            error = %error
        );
        return;
    }

    match error.category() {
        ErrorCategory::Client => lwarn!(
            request_id,
            LogStage::RequestStart,
            LogComponent::Gateway,
            "request_rejected",
            "请求处理失败",
            status = status.as_u16(),
            code = code,
            error = %error
        ),
        ErrorCategory::Server => lerror!(
            request_id,
            LogStage::UpstreamRequest,
            LogComponent::Gateway,
            "request_failed",
            "代理调用失败",
            status = status.as_u16(),
            code = code,
            error = ?error
        ),
    }
}
