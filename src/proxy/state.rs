use crate::auth::{
    AnonymousAuthenticator, Authenticator, ClaimsTenantResolver, JwtAuthenticator,
    StaticTenantResolver, TenantResolver,
};
use crate::config::{AppConfig, TenantConfig};
use crate::discovery::StaticDiscovery;
use crate::error::{Context, Result};
use crate::proxy::retry_policy::RetryPolicy;
use crate::proxy::route_table::RouteTable;
use crate::proxy::service::{GatewayCollaborators, GatewayService};
use crate::proxy::upstream::ReqwestUpstreamClient;
use std::ops::Deref;
use std::sync::Arc;

/// 代理服务的共享状态
///
/// 路由表与管理端共享；其余依赖只由网关管线使用。
#[derive(Clone)]
pub struct ProxyState {
    routes: Arc<RouteTable>,
    discovery: Arc<StaticDiscovery>,
    gateway: Arc<GatewayService>,
}

impl ProxyState {
    #[must_use]
    pub fn new(
        routes: Arc<RouteTable>,
        discovery: Arc<StaticDiscovery>,
        gateway: GatewayService,
    ) -> Self {
        Self {
            routes,
            discovery,
            gateway: Arc::new(gateway),
        }
    }

    /// 按配置装配：种子路由、静态服务发现、认证、租户解析与上游连接池
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let routes = Arc::new(RouteTable::with_routes(config.routes.clone()));
        let discovery = Arc::new(StaticDiscovery::from_config(&config.discovery));

        let authenticator: Arc<dyn Authenticator> = match &config.auth {
            Some(auth) => Arc::new(JwtAuthenticator::new(auth).context("JWT 认证器初始化失败")?),
            None => Arc::new(AnonymousAuthenticator),
        };
        let tenant_resolver: Arc<dyn TenantResolver> = match &config.tenant {
            TenantConfig::Claims => Arc::new(ClaimsTenantResolver),
            TenantConfig::Static { .. } => {
                Arc::new(StaticTenantResolver::new(config.tenant.static_identity()))
            }
        };

        let gateway = GatewayService::new(
            GatewayCollaborators {
                routes: Arc::clone(&routes),
                discovery: discovery.clone(),
                client: Arc::new(
                    ReqwestUpstreamClient::new(&config.upstream).context("上游客户端初始化失败")?,
                ),
                authenticator,
                tenant_resolver,
            },
            &config.gateway,
            RetryPolicy::from(&config.retry),
        );

        Ok(Self::new(routes, discovery, gateway))
    }

    #[must_use]
    pub fn routes(&self) -> Arc<RouteTable> {
        Arc::clone(&self.routes)
    }

    #[must_use]
    pub fn discovery(&self) -> Arc<StaticDiscovery> {
        Arc::clone(&self.discovery)
    }
}

impl Deref for ProxyState {
    type Target = GatewayService;

    fn deref(&self) -> &Self::Target {
        &self.gateway
    }
}
