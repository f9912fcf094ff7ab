//! # 端点解析
//!
//! 封装外部服务发现：把 服务定位符 + 分区选择器 解析为分区句柄，
//! 从句柄中提取监听器地址，并在路由过期时重新解析。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::proxy::identity::IdentityModel;
use crate::proxy::partition::PartitionHasher;
use crate::proxy::route_table::RouteEntry;
use crate::{ldebug, linfo};

/// 分区选择器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionSelector {
    /// 非分区服务
    Singleton,
    /// 分区索引
    Int64(i64),
}

impl fmt::Display for PartitionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => f.write_str("singleton"),
            Self::Int64(key) => write!(f, "int64:{key}"),
        }
    }
}

/// 端点描述：地址是形如 `{"Endpoints":{"<listener>":"<url>"}}` 的 JSON 串
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub address: String,
}

impl EndpointDescriptor {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// 由监听器表构建描述
    pub fn from_listeners<'a>(listeners: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let endpoints: serde_json::Map<String, Value> = listeners
            .into_iter()
            .map(|(name, url)| (name.to_string(), Value::String(url.to_string())))
            .collect();
        Self::new(serde_json::json!({ "Endpoints": endpoints }).to_string())
    }
}

/// 服务发现返回的分区句柄（请求内临时值）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPartition {
    pub service_uri: String,
    pub selector: PartitionSelector,
    pub endpoints: Vec<EndpointDescriptor>,
    /// 注册版本，每次重新解析递增
    pub version: u64,
}

/// 服务发现协作方
#[async_trait]
pub trait PartitionDiscovery: Send + Sync {
    /// 解析服务分区
    async fn resolve(&self, service_uri: &str, selector: PartitionSelector)
    -> Result<ResolvedPartition>;

    /// 用先前的句柄换取同一分区的最新句柄
    async fn re_resolve(&self, previous: &ResolvedPartition) -> Result<ResolvedPartition>;
}

/// 端点解析器
pub struct EndpointResolver {
    discovery: Arc<dyn PartitionDiscovery>,
    hasher: PartitionHasher,
}

impl EndpointResolver {
    #[must_use]
    pub fn new(discovery: Arc<dyn PartitionDiscovery>) -> Self {
        Self::with_hasher(discovery, PartitionHasher::default())
    }

    #[must_use]
    pub fn with_hasher(discovery: Arc<dyn PartitionDiscovery>, hasher: PartitionHasher) -> Self {
        Self { discovery, hasher }
    }

    /// 路由对应的分区选择器：分区路由按组织前缀哈希，否则为 singleton
    #[must_use]
    pub fn selector_for(&self, route: &RouteEntry, identity: &IdentityModel) -> PartitionSelector {
        if route.is_partitioned {
            PartitionSelector::Int64(i64::from(
                self.hasher.resolve(identity.organization_prefix()),
            ))
        } else {
            PartitionSelector::Singleton
        }
    }

    /// 解析分区，调用方断开时立即返回
    pub async fn resolve(
        &self,
        request_id: &str,
        service_uri: &str,
        selector: PartitionSelector,
        cancel: &CancellationToken,
    ) -> Result<ResolvedPartition> {
        let resolved = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ProxyError::cancelled("服务发现期间调用方断开")),
            resolved = self.discovery.resolve(service_uri, selector) => resolved?,
        };

        ldebug!(
            request_id,
            LogStage::Discovery,
            LogComponent::Discovery,
            "partition_resolved",
            "分区解析完成",
            service_uri = service_uri,
            selector = %selector,
            version = resolved.version,
            endpoints = resolved.endpoints.len()
        );
        Ok(resolved)
    }

    /// 重新解析分区
    pub async fn re_resolve(
        &self,
        request_id: &str,
        previous: &ResolvedPartition,
        cancel: &CancellationToken,
    ) -> Result<ResolvedPartition> {
        let resolved = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ProxyError::cancelled("重新解析期间调用方断开")),
            resolved = self.discovery.re_resolve(previous) => resolved?,
        };

        linfo!(
            request_id,
            LogStage::Discovery,
            LogComponent::Discovery,
            "partition_re_resolved",
            "路由信息过期，已重新解析分区",
            service_uri = %previous.service_uri,
            selector = %previous.selector,
            previous_version = previous.version,
            version = resolved.version
        );
        Ok(resolved)
    }

    /// 从分区句柄中提取监听器地址
    ///
    /// 只有一个监听器时直接使用它，忽略请求的监听器名；
    /// 找不到时返回 `EndpointNotFound`，而不是构造空地址。
    pub fn extract_endpoint(
        resolved: &ResolvedPartition,
        listener_name: Option<&str>,
    ) -> Result<String> {
        let descriptor = resolved.endpoints.first().ok_or_else(|| {
            ProxyError::endpoint_not_found(format!(
                "服务 {} 分区 {} 没有可用端点",
                resolved.service_uri, resolved.selector
            ))
        })?;

        let mut listeners = parse_listeners(&descriptor.address)?;
        if listeners.len() == 1 {
            return Ok(listeners.into_values().collect());
        }

        let wanted = listener_name.unwrap_or_default().to_lowercase();
        listeners.remove(&wanted).ok_or_else(|| {
            ProxyError::endpoint_not_found(format!(
                "服务 {} 没有名为 '{wanted}' 的监听器",
                resolved.service_uri
            ))
        })
    }
}

/// 解析端点地址中的监听器表，键统一转为小写
///
/// 任一监听器地址不是字符串，或名称忽略大小写后重复，整个描述符视为无效。
fn parse_listeners(address: &str) -> Result<HashMap<String, String>> {
    let value: Value = serde_json::from_str(address).map_err(|e| {
        ProxyError::endpoint_not_found(format!("端点地址不是合法的 JSON: {e}"))
    })?;

    let endpoints = value
        .as_object()
        .and_then(|root| {
            root.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("endpoints"))
                .map(|(_, endpoints)| endpoints)
        })
        .and_then(Value::as_object)
        .ok_or_else(|| ProxyError::endpoint_not_found("端点地址缺少 Endpoints 字段"))?;

    let mut listeners = HashMap::with_capacity(endpoints.len());
    for (name, url) in endpoints {
        let url = url.as_str().ok_or_else(|| {
            ProxyError::endpoint_not_found(format!("监听器 '{name}' 的地址不是字符串"))
        })?;
        if listeners.insert(name.to_lowercase(), url.to_string()).is_some() {
            return Err(ProxyError::endpoint_not_found(format!(
                "监听器名称重复: '{name}'"
            )));
        }
    }
    Ok(listeners)
}
