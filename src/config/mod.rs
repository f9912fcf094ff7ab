//! # 配置管理模块
//!
//! 处理应用配置加载、验证和管理

mod app_config;
mod dual_port_config;
mod manager;

pub use app_config::{
    AppConfig, AuthConfig, DiscoveryConfig, GatewayConfig, PartitionRegistration, RetryConfig,
    ServiceRegistration, TenantConfig, UpstreamConfig,
};
pub use dual_port_config::{
    DualPortServerConfig, ListenerConfig, ManagementPortConfig, ProxyPortConfig,
};
pub use manager::{CONFIG_PATH_ENV, ConfigManager, default_config_path};

use std::collections::HashSet;
use std::path::Path;

use crate::ensure_config;
use crate::error::{ProxyError, Result};
use crate::proxy::route_table::validate_entries;

/// 加载配置文件（含环境变量覆盖与校验）
pub fn load_config(explicit_path: Option<&Path>) -> Result<AppConfig> {
    Ok(ConfigManager::new(explicit_path)?.into_config())
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<()> {
    config.dual_port.validate()?;

    ensure_config!(
        !config.gateway.host_name.trim().is_empty(),
        "gateway.host_name 不能为空"
    );
    ensure_config!(
        config.gateway.max_body_bytes > 0,
        "gateway.max_body_bytes 必须大于0"
    );
    ensure_config!(
        config.retry.base_delay_ms <= config.retry.max_delay_ms,
        "retry.base_delay_ms ({}) 不能大于 retry.max_delay_ms ({})",
        config.retry.base_delay_ms,
        config.retry.max_delay_ms
    );
    ensure_config!(
        config.upstream.request_timeout_ms > 0,
        "upstream.request_timeout_ms 必须大于0"
    );

    if let Some(auth) = &config.auth {
        ensure_config!(!auth.jwt_secret.is_empty(), "auth.jwt_secret 不能为空");
    }

    if let TenantConfig::Static {
        organization_prefix,
        ..
    } = &config.tenant
    {
        ensure_config!(
            !organization_prefix.is_empty(),
            "tenant.organization_prefix 不能为空"
        );
    }

    validate_entries(&config.routes)
        .map_err(|e| ProxyError::config_with_source("routes 配置无效", e))?;

    validate_discovery(&config.discovery)
}

fn validate_discovery(discovery: &DiscoveryConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for service in &discovery.services {
        let uri = service.service_uri.as_str();
        ensure_config!(!uri.trim().is_empty(), "discovery.services.service_uri 不能为空");
        ensure_config!(seen.insert(uri), "服务 {} 重复注册", uri);
        ensure_config!(!service.partitions.is_empty(), "服务 {} 至少需要一个分区", uri);

        for partition in &service.partitions {
            ensure_config!(!partition.listeners.is_empty(), "服务 {} 的分区缺少监听器", uri);
            if let (Some(low), Some(high)) = (partition.low_key, partition.high_key) {
                ensure_config!(low <= high, "服务 {} 的分区范围无效: [{}, {}]", uri, low, high);
            }
        }
    }
    Ok(())
}
