//! # 分区感知代理模块
//!
//! 入站请求的完整管线：路由匹配、准入校验、分区解析、带重试的上游调用与响应回写。

pub mod endpoint_resolver;
pub mod executor;
pub mod headers;
pub mod identity;
pub mod partition;
pub mod request;
pub mod response;
pub mod retry_policy;
pub mod route_table;
pub mod route_validator;
pub mod server;
pub mod service;
pub mod state;
pub mod upstream;

pub use endpoint_resolver::{
    EndpointDescriptor, EndpointResolver, PartitionDiscovery, PartitionSelector, ResolvedPartition,
};
pub use executor::{ExecutionReport, ProxyOutcome, RetryingProxyExecutor};
pub use headers::HeaderRewriter;
pub use identity::{IDENTITY_HEADER, IdentityModel};
pub use partition::PartitionHasher;
pub use request::InboundRequest;
pub use response::ResponseRelay;
pub use retry_policy::{RetryDecision, RetryPolicy, RetryReason};
pub use route_table::{RouteEntry, RouteTable};
pub use route_validator::{AdmissionError, RouteValidator, ValidationResult};
pub use server::{ProxyServer, create_router};
pub use service::{GatewayCollaborators, GatewayService};
pub use state::ProxyState;
pub use upstream::{ReqwestUpstreamClient, UpstreamClient, UpstreamRequest, UpstreamResponse};
