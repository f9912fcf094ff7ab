//! # 应用配置结构定义

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::dual_port_config::DualPortServerConfig;
use crate::proxy::identity::IdentityModel;
use crate::proxy::route_table::RouteEntry;

/// 应用主配置结构
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 双端口服务器配置
    #[serde(default)]
    pub dual_port: DualPortServerConfig,
    /// 网关行为
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// 重试策略
    #[serde(default)]
    pub retry: RetryConfig,
    /// 上游连接池
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// JWT 认证（缺省时所有请求视为未认证）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    /// 租户解析
    #[serde(default)]
    pub tenant: TenantConfig,
    /// 启动时装入的路由表
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    /// 静态服务发现注册表
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// 网关配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// 写入 `Via` / `Forwarded` 的网关主机名
    pub host_name: String,
    /// 网关挂载的路径基址，例如 `/api`
    pub path_base: Option<String>,
    /// 缓冲请求体上限（字节）
    pub max_body_bytes: usize,
    /// 是否启用 gzip 响应压缩
    pub enable_compression: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host_name: "partition-gateway".to_string(),
            path_base: None,
            max_body_bytes: 10 * 1024 * 1024,
            enable_compression: false,
        }
    }
}

/// 重试配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 最大重试次数
    pub max_retries: u32,
    /// 退避基数（毫秒）
    pub base_delay_ms: u64,
    /// 退避上限（毫秒）
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 500,
            max_delay_ms: 32_000,
        }
    }
}

/// 上游客户端配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 100_000,
            pool_max_idle_per_host: 32,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// JWT 认证配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 密钥
    pub jwt_secret: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    /// 过期时间容差（秒）
    #[serde(default)]
    pub leeway_seconds: u64,
}

/// 租户解析器选择
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolver", rename_all = "snake_case")]
pub enum TenantConfig {
    /// 从令牌声明解析
    #[default]
    Claims,
    /// 固定租户
    Static {
        organization_prefix: String,
        #[serde(default)]
        username: String,
        #[serde(default)]
        entity_id: String,
        #[serde(default)]
        language: Option<String>,
    },
}

impl TenantConfig {
    /// 静态租户对应的身份
    #[must_use]
    pub fn static_identity(&self) -> Option<IdentityModel> {
        match self {
            Self::Claims => None,
            Self::Static {
                organization_prefix,
                username,
                entity_id,
                language,
            } => Some(IdentityModel::create(
                organization_prefix.as_str(),
                username.as_str(),
                entity_id.as_str(),
                language.as_deref(),
            )),
        }
    }
}

/// 静态服务发现配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub services: Vec<ServiceRegistration>,
}

/// 一个服务的分区注册
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    /// 服务定位符，例如 `svc:orders`
    pub service_uri: String,
    pub partitions: Vec<PartitionRegistration>,
}

/// 一个分区的键范围与监听器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRegistration {
    /// 键范围下界（含），缺省表示 singleton 分区
    #[serde(default)]
    pub low_key: Option<i64>,
    /// 键范围上界（含）
    #[serde(default)]
    pub high_key: Option<i64>,
    /// 监听器名 → URL
    pub listeners: BTreeMap<String, String>,
}

impl PartitionRegistration {
    /// 单监听器的 singleton 分区
    pub fn singleton(url: impl Into<String>) -> Self {
        Self {
            low_key: None,
            high_key: None,
            listeners: BTreeMap::from([(String::new(), url.into())]),
        }
    }

    /// 覆盖 `[low, high]` 键范围的单监听器分区
    pub fn ranged(low_key: i64, high_key: i64, url: impl Into<String>) -> Self {
        Self {
            low_key: Some(low_key),
            high_key: Some(high_key),
            ..Self::singleton(url)
        }
    }

    /// 分区是否覆盖给定键；无范围的分区覆盖所有键
    #[must_use]
    pub fn contains(&self, key: i64) -> bool {
        self.low_key.is_none_or(|low| key >= low) && self.high_key.is_none_or(|high| key <= high)
    }
}
