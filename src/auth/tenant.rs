//! # 租户解析器
//!
//! 把一次请求解析为调用方身份；解析不到时返回 `None`，由路由校验器决定如何处理。

use async_trait::async_trait;

use super::Principal;
use crate::error::Result;
use crate::proxy::identity::IdentityModel;
use crate::proxy::request::InboundRequest;

/// 租户解析器
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// 解析调用方身份
    async fn resolve(
        &self,
        request: &InboundRequest,
        principal: Option<&Principal>,
    ) -> Result<Option<IdentityModel>>;
}

/// 从令牌声明构建身份；没有主体或缺少 `org` 声明时解析不到租户
#[derive(Debug, Default, Clone, Copy)]
pub struct ClaimsTenantResolver;

#[async_trait]
impl TenantResolver for ClaimsTenantResolver {
    async fn resolve(
        &self,
        _request: &InboundRequest,
        principal: Option<&Principal>,
    ) -> Result<Option<IdentityModel>> {
        let Some(principal) = principal else {
            return Ok(None);
        };
        let claims = principal.claims();
        let Some(org) = claims.org.as_deref().filter(|org| !org.is_empty()) else {
            return Ok(None);
        };

        let identity = IdentityModel::create(
            org,
            claims.username.as_deref().unwrap_or(&claims.sub),
            claims.entity_id.as_deref().unwrap_or_default(),
            claims.lang.as_deref(),
        )
        .with_id(claims.uid.unwrap_or_default());

        Ok(Some(identity))
    }
}

/// 总是返回固定租户（开发环境或单租户部署）
#[derive(Debug, Clone, Default)]
pub struct StaticTenantResolver {
    identity: Option<IdentityModel>,
}

impl StaticTenantResolver {
    /// 固定返回给定身份
    #[must_use]
    pub const fn new(identity: Option<IdentityModel>) -> Self {
        Self { identity }
    }

    /// 固定返回给定组织前缀的身份
    pub fn for_prefix(prefix: impl Into<String>) -> Self {
        Self::new(Some(IdentityModel::create(prefix, "", "", None)))
    }
}

#[async_trait]
impl TenantResolver for StaticTenantResolver {
    async fn resolve(
        &self,
        _request: &InboundRequest,
        _principal: Option<&Principal>,
    ) -> Result<Option<IdentityModel>> {
        Ok(self.identity.clone())
    }
}
