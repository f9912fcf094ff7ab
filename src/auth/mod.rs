//! # 认证与租户解析
//!
//! 网关只消费认证的通过/失败信号和令牌声明；租户身份由可替换的解析器给出。

pub mod jwt;
pub mod tenant;

use axum::http::HeaderMap;

pub use jwt::{GatewayClaims, JwtAuthenticator};
pub use tenant::{ClaimsTenantResolver, StaticTenantResolver, TenantResolver};

/// 已认证的调用方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    claims: GatewayClaims,
}

impl Principal {
    /// 由令牌声明创建
    #[must_use]
    pub const fn new(claims: GatewayClaims) -> Self {
        Self { claims }
    }

    /// 主体标识
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    /// 令牌声明
    #[must_use]
    pub const fn claims(&self) -> &GatewayClaims {
        &self.claims
    }
}

/// 认证器：给出请求是否已认证
pub trait Authenticator: Send + Sync {
    /// 认证成功返回调用方主体
    fn authenticate(&self, headers: &HeaderMap) -> Option<Principal>;
}

/// 未配置认证时使用：所有请求均视为未认证
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousAuthenticator;

impl Authenticator for AnonymousAuthenticator {
    fn authenticate(&self, _headers: &HeaderMap) -> Option<Principal> {
        None
    }
}
