//! # 测试替身
//!
//! 网关各接缝（上游客户端、服务发现、租户解析）的脚本化实现，记录调用以便断言。

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::auth::{Principal, TenantResolver};
use crate::error::{ProxyError, Result};
use crate::proxy::endpoint_resolver::{
    EndpointDescriptor, PartitionDiscovery, PartitionSelector, ResolvedPartition,
};
use crate::proxy::identity::IdentityModel;
use crate::proxy::request::InboundRequest;
use crate::proxy::upstream::{UpstreamClient, UpstreamRequest, UpstreamResponse};

/// 上游脚本中的一步
#[derive(Debug, Clone)]
pub enum UpstreamStep {
    Respond { status: u16, body: String },
    Fail,
    Hang,
}

impl UpstreamStep {
    pub fn respond(status: u16, body: &str) -> Self {
        Self::Respond {
            status,
            body: body.to_string(),
        }
    }

    /// 传输层失败
    pub const fn fail() -> Self {
        Self::Fail
    }

    /// 永不返回，用于测试取消
    pub const fn hang() -> Self {
        Self::Hang
    }
}

/// 按脚本依次应答的上游客户端
#[derive(Debug, Default)]
pub struct ScriptedUpstream {
    steps: Mutex<VecDeque<UpstreamStep>>,
    seen: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedUpstream {
    pub fn new(steps: Vec<UpstreamStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 收到的全部请求
    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// 收到的请求地址，按调用顺序
    pub fn urls(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.url.to_string())
            .collect()
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let url = request.url.to_string();
        self.seen.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();

        match step {
            Some(UpstreamStep::Respond { status, body }) => {
                let status = StatusCode::from_u16(status)
                    .map_err(|e| ProxyError::internal_with_source("脚本状态码非法", e))?;
                Ok(UpstreamResponse::new(status, HeaderMap::new(), body))
            }
            Some(UpstreamStep::Fail) => Err(ProxyError::network(format!("connection refused: {url}"))),
            Some(UpstreamStep::Hang) => futures::future::pending().await,
            None => Err(ProxyError::internal(format!("上游脚本已耗尽: {url}"))),
        }
    }
}

/// 记录调用次数的服务发现
///
/// 首次解析总是返回第一个地址；第 i 次重新解析返回第 i 个后续地址，
/// 地址用完后停留在最后一个。
#[derive(Debug)]
pub struct CountingDiscovery {
    endpoints: Vec<String>,
    resolves: AtomicUsize,
    re_resolves: AtomicUsize,
}

impl CountingDiscovery {
    pub fn sequence(endpoints: &[&str]) -> Self {
        Self {
            endpoints: endpoints.iter().map(ToString::to_string).collect(),
            resolves: AtomicUsize::new(0),
            re_resolves: AtomicUsize::new(0),
        }
    }

    pub fn single(endpoint: &str) -> Self {
        Self::sequence(&[endpoint])
    }

    /// 不计数的初始解析结果
    pub fn partition(&self, selector: PartitionSelector) -> ResolvedPartition {
        self.resolved("svc:orders", selector, 0, 1)
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn re_resolves(&self) -> usize {
        self.re_resolves.load(Ordering::SeqCst)
    }

    fn resolved(
        &self,
        service_uri: &str,
        selector: PartitionSelector,
        index: usize,
        version: u64,
    ) -> ResolvedPartition {
        let endpoints = self
            .endpoints
            .get(index.min(self.endpoints.len().saturating_sub(1)))
            .map(|address| EndpointDescriptor::from_listeners([("", address.as_str())]))
            .into_iter()
            .collect();

        ResolvedPartition {
            service_uri: service_uri.to_string(),
            selector,
            endpoints,
            version,
        }
    }
}

#[async_trait]
impl PartitionDiscovery for CountingDiscovery {
    async fn resolve(
        &self,
        service_uri: &str,
        selector: PartitionSelector,
    ) -> Result<ResolvedPartition> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(self.resolved(service_uri, selector, 0, 1))
    }

    async fn re_resolve(&self, previous: &ResolvedPartition) -> Result<ResolvedPartition> {
        let index = self.re_resolves.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.resolved(
            &previous.service_uri,
            previous.selector,
            index,
            previous.version + 1,
        ))
    }
}

/// 返回固定身份并记录调用次数的租户解析器
#[derive(Debug)]
pub struct CountingTenantResolver {
    identity: Option<IdentityModel>,
    calls: AtomicUsize,
}

impl CountingTenantResolver {
    pub const fn new(identity: Option<IdentityModel>) -> Self {
        Self {
            identity,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantResolver for CountingTenantResolver {
    async fn resolve(
        &self,
        _request: &InboundRequest,
        _principal: Option<&Principal>,
    ) -> Result<Option<IdentityModel>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.identity.clone())
    }
}
