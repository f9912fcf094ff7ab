//! # 日志配置模块
//!
//! 提供 tracing 订阅器初始化，以及带请求 ID / 阶段 / 组件字段的结构化日志宏

use std::env;
use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 请求处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    /// 进程启动
    Startup,
    /// 进程关闭
    Shutdown,
    /// 配置加载
    Configuration,
    /// 收到入站请求
    RequestStart,
    /// 路由准入校验
    Admission,
    /// 分区与端点解析
    Discovery,
    /// 发送上游请求
    UpstreamRequest,
    /// 重试调度
    Retry,
    /// 回写响应
    Relay,
    /// 管理端操作
    Management,
}

impl LogStage {
    /// 阶段名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Configuration => "configuration",
            Self::RequestStart => "request_start",
            Self::Admission => "admission",
            Self::Discovery => "discovery",
            Self::UpstreamRequest => "upstream_request",
            Self::Retry => "retry",
            Self::Relay => "relay",
            Self::Management => "management",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    /// 主程序
    Main,
    /// 服务器装配
    ServerSetup,
    /// 配置管理
    Config,
    /// 路由表
    RouteTable,
    /// 路由校验器
    Validator,
    /// 认证与租户解析
    Auth,
    /// 服务发现
    Discovery,
    /// 重试执行器
    Executor,
    /// 上游客户端
    Upstream,
    /// 响应回写
    Relay,
    /// 网关入口
    Gateway,
    /// 管理端
    Management,
}

impl LogComponent {
    /// 组件名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::ServerSetup => "server_setup",
            Self::Config => "config",
            Self::RouteTable => "route_table",
            Self::Validator => "validator",
            Self::Auth => "auth",
            Self::Discovery => "discovery",
            Self::Executor => "executor",
            Self::Upstream => "upstream",
            Self::Relay => "relay",
            Self::Gateway => "gateway",
            Self::Management => "management",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 结构化 info 日志
///
/// `linfo!(request_id, stage, component, operation, description, key = value, ...)`
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr $(, $($field:tt)+)?) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            $($($field)+ ,)?
            "{}",
            $description
        )
    };
}

/// 结构化 debug 日志
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr $(, $($field:tt)+)?) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            $($($field)+ ,)?
            "{}",
            $description
        )
    };
}

/// 结构化 warn 日志
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr $(, $($field:tt)+)?) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            $($($field)+ ,)?
            "{}",
            $description
        )
    };
}

/// 结构化 error 日志
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr $(, $($field:tt)+)?) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            $($($field)+ ,)?
            "{}",
            $description
        )
    };
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先；否则使用 `{level},partition_gateway=debug`
pub fn init_optimized_logging(log_level: Option<&String>) {
    let level = log_level.map_or("info", String::as_str);

    let default_filter = format!("{level},partition_gateway=debug,hyper=warn,reqwest=warn");

    let log_filter = env::var("RUST_LOG").unwrap_or(default_filter);

    // 测试或重复初始化时忽略错误
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}

/// 环境变量设置指南
pub fn print_logging_help() {
    println!("📋 日志配置指南:");
    println!("  RUST_LOG=info                              # 标准日志级别");
    println!("  RUST_LOG=debug                             # 调试级别");
    println!("  RUST_LOG=info,partition_gateway=trace      # 网关详细追踪");
    println!("  RUST_LOG=info,tower_http=debug             # 打开 HTTP 访问日志");
}
