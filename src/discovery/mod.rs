//! # 静态服务发现
//!
//! 由配置装入的内存注册表，实现 [`PartitionDiscovery`]。
//! 注册表可以在运行时整体替换某个服务的分区（模拟分区迁移），
//! 替换后重新解析即可拿到新的端点。

use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{DiscoveryConfig, PartitionRegistration, ServiceRegistration};
use crate::error::{ProxyError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use crate::proxy::endpoint_resolver::{
    EndpointDescriptor, PartitionDiscovery, PartitionSelector, ResolvedPartition,
};

type Registry = HashMap<String, Arc<ServiceRegistration>>;

/// 内存服务发现
pub struct StaticDiscovery {
    registry: ArcSwap<Registry>,
    version: AtomicU64,
}

impl StaticDiscovery {
    /// 以给定注册创建
    #[must_use]
    pub fn new(services: Vec<ServiceRegistration>) -> Self {
        let registry = services
            .into_iter()
            .map(|service| (service.service_uri.clone(), Arc::new(service)))
            .collect();
        Self {
            registry: ArcSwap::from_pointee(registry),
            version: AtomicU64::new(1),
        }
    }

    /// 从配置创建
    #[must_use]
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(config.services.clone())
    }

    /// 当前注册表版本
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// 已注册的服务数
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.registry.load().len()
    }

    /// 新增或替换一个服务的注册，返回新版本
    pub fn update_service(&self, registration: ServiceRegistration) -> u64 {
        let service_uri = registration.service_uri.clone();
        let registration = Arc::new(registration);
        self.registry.rcu(|current| {
            let mut next = Registry::clone(current);
            next.insert(service_uri.clone(), Arc::clone(&registration));
            next
        });
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;

        linfo!(
            "system",
            LogStage::Discovery,
            LogComponent::Discovery,
            "service_updated",
            "服务注册已更新",
            service_uri = %service_uri,
            partitions = registration.partitions.len(),
            version = version
        );
        version
    }

    fn lookup(
        &self,
        service_uri: &str,
        selector: PartitionSelector,
        version: u64,
    ) -> Result<ResolvedPartition> {
        let registry = self.registry.load();
        let service = registry
            .get(service_uri)
            .ok_or_else(|| ProxyError::discovery(format!("服务未注册: {service_uri}")))?;

        let partition = select_partition(&service.partitions, selector).ok_or_else(|| {
            ProxyError::discovery(format!("服务 {service_uri} 没有覆盖 {selector} 的分区"))
        })?;

        Ok(ResolvedPartition {
            service_uri: service_uri.to_string(),
            selector,
            endpoints: vec![EndpointDescriptor::from_listeners(
                partition
                    .listeners
                    .iter()
                    .map(|(name, url)| (name.as_str(), url.as_str())),
            )],
            version,
        })
    }
}

/// singleton 选择唯一分区或无范围分区；整数键选择第一个覆盖它的分区
fn select_partition(
    partitions: &[PartitionRegistration],
    selector: PartitionSelector,
) -> Option<&PartitionRegistration> {
    match selector {
        PartitionSelector::Singleton => match partitions {
            [only] => Some(only),
            _ => partitions
                .iter()
                .find(|p| p.low_key.is_none() && p.high_key.is_none()),
        },
        PartitionSelector::Int64(key) => partitions.iter().find(|p| p.contains(key)),
    }
}

#[async_trait]
impl PartitionDiscovery for StaticDiscovery {
    async fn resolve(
        &self,
        service_uri: &str,
        selector: PartitionSelector,
    ) -> Result<ResolvedPartition> {
        self.lookup(service_uri, selector, self.version())
    }

    async fn re_resolve(&self, previous: &ResolvedPartition) -> Result<ResolvedPartition> {
        let bumped = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        self.lookup(
            &previous.service_uri,
            previous.selector,
            bumped.max(previous.version + 1),
        )
    }
}
