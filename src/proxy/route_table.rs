//! # 路由表
//!
//! 有序、整体替换的路由条目集合。读取方通过 `ArcSwap` 拿到不可变快照，
//! 替换不会阻塞读取，读取方也不会看到新旧混合的条目序列。

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{ProxyError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};

/// 路由条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    /// 路径前缀（非空）
    pub path_matcher: String,
    /// 是否需要按租户选择分区
    #[serde(default)]
    pub is_partitioned: bool,
    /// 后端服务定位符，原样传给服务发现
    pub service_uri: String,
    /// 多监听端点时选择的监听器名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener_name: Option<String>,
    /// 是否允许未认证访问
    #[serde(default)]
    pub is_open: bool,
    /// 追踪标签，只转发不解析
    #[serde(default)]
    pub correlation_id: String,
}

impl RouteEntry {
    /// 创建新的路由条目（默认：非分区、需认证）
    pub fn new(path_matcher: impl Into<String>, service_uri: impl Into<String>) -> Self {
        Self {
            path_matcher: path_matcher.into(),
            is_partitioned: false,
            service_uri: service_uri.into(),
            listener_name: None,
            is_open: false,
            correlation_id: String::new(),
        }
    }

    /// 设置是否分区
    #[must_use]
    pub const fn partitioned(mut self, is_partitioned: bool) -> Self {
        self.is_partitioned = is_partitioned;
        self
    }

    /// 设置是否开放
    #[must_use]
    pub const fn open(mut self, is_open: bool) -> Self {
        self.is_open = is_open;
        self
    }

    /// 设置监听器名称
    #[must_use]
    pub fn with_listener(mut self, listener_name: impl Into<String>) -> Self {
        self.listener_name = Some(listener_name.into());
        self
    }

    /// 设置追踪标签
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// 路径前缀匹配
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.path_matcher)
    }

    /// 校验条目
    pub fn validate(&self) -> Result<()> {
        if self.path_matcher.is_empty() {
            return Err(ProxyError::validation(
                "pathMatcher 不能为空",
                Some("pathMatcher".to_string()),
            ));
        }
        if self.service_uri.trim().is_empty() {
            return Err(ProxyError::validation(
                format!("路由 {} 缺少 serviceUri", self.path_matcher),
                Some("serviceUri".to_string()),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CorrelationId: {}, Match: {}, Partitioned: {}, Open: {}, Listener: {}, Service: {}",
            self.correlation_id,
            self.path_matcher,
            self.is_partitioned,
            self.is_open,
            self.listener_name.as_deref().unwrap_or_default(),
            self.service_uri
        )
    }
}

/// 校验一组条目，任意一条不合法则整体拒绝
pub fn validate_entries(entries: &[RouteEntry]) -> Result<()> {
    entries.iter().try_for_each(RouteEntry::validate)
}

/// 路由表快照
pub type RouteSnapshot = Arc<Vec<RouteEntry>>;

/// 路由表
pub struct RouteTable {
    routes: ArcSwap<Vec<RouteEntry>>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.snapshot().len())
            .finish()
    }
}

impl RouteTable {
    /// 创建空路由表
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// 以给定条目创建路由表
    #[must_use]
    pub fn with_routes(entries: Vec<RouteEntry>) -> Self {
        Self {
            routes: ArcSwap::from_pointee(entries),
        }
    }

    /// 原子地安装新快照，返回安装后的快照
    pub fn replace(&self, entries: Vec<RouteEntry>) -> RouteSnapshot {
        let snapshot = Arc::new(entries);
        self.routes.store(Arc::clone(&snapshot));

        linfo!(
            "system",
            LogStage::Management,
            LogComponent::RouteTable,
            "route_table_replaced",
            "路由表已整体替换",
            routes = snapshot.len()
        );

        snapshot
    }

    /// 当前快照
    #[must_use]
    pub fn snapshot(&self) -> RouteSnapshot {
        self.routes.load_full()
    }

    /// 按表顺序返回第一个前缀匹配的条目
    #[must_use]
    pub fn first_match(&self, path: &str) -> Option<RouteEntry> {
        self.routes
            .load()
            .iter()
            .find(|entry| entry.matches(path))
            .cloned()
    }
}
