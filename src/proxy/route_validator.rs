//! # 路由准入校验
//!
//! 按固定顺序做出准入决策：路由匹配 → 认证 → 租户解析 → 分区要求。
//! 认证先于租户解析检查，分区要求最后检查。

use axum::http::StatusCode;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::{Principal, TenantResolver};
use crate::error::Result;
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use crate::proxy::identity::IdentityModel;
use crate::proxy::request::InboundRequest;
use crate::proxy::route_table::{RouteEntry, RouteTable};

/// 准入失败原因（终止，不重试，不调用上游）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// 没有匹配的路由
    #[error("route not found")]
    RouteNotFound,
    /// 非开放路由且未认证
    #[error("unauthenticated")]
    Unauthenticated,
    /// 非开放路由且解析不到租户
    #[error("tenant forbidden")]
    TenantForbidden,
    /// 分区路由但解析不到租户
    #[error("partitioned route requires a tenant")]
    PartitionRequiredNoTenant,
}

impl AdmissionError {
    /// 对应的 HTTP 状态码
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::TenantForbidden => StatusCode::FORBIDDEN,
            Self::PartitionRequiredNoTenant => StatusCode::BAD_REQUEST,
        }
    }
}

/// 准入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// 准入成功
    Success {
        /// 调用方身份（无租户时为空哨兵）
        identity: IdentityModel,
        /// 命中的路由
        route: RouteEntry,
    },
    /// 准入失败
    Failure(AdmissionError),
}

impl ValidationResult {
    /// 状态码：成功为 200
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Success { .. } => StatusCode::OK,
            Self::Failure(error) => error.status_code(),
        }
    }
}

/// 路由校验器
pub struct RouteValidator {
    routes: Arc<RouteTable>,
    tenant_resolver: Arc<dyn TenantResolver>,
}

impl RouteValidator {
    /// 创建新的校验器
    #[must_use]
    pub fn new(routes: Arc<RouteTable>, tenant_resolver: Arc<dyn TenantResolver>) -> Self {
        Self {
            routes,
            tenant_resolver,
        }
    }

    /// 对入站请求做准入校验
    ///
    /// 只有在通过认证检查后才会调用租户解析器；解析器自身的错误向上传播。
    pub async fn validate(
        &self,
        request: &InboundRequest,
        principal: Option<&Principal>,
    ) -> Result<ValidationResult> {
        let Some(route) = self.routes.first_match(&request.path) else {
            return Ok(self.reject(request, AdmissionError::RouteNotFound));
        };

        let is_authenticated = principal.is_some();
        if !route.is_open && !is_authenticated {
            return Ok(self.reject(request, AdmissionError::Unauthenticated));
        }

        let identity = self.tenant_resolver.resolve(request, principal).await?;
        Ok(decide(route, identity).map_or_else(
            |error| self.reject(request, error),
            |(identity, route)| ValidationResult::Success { identity, route },
        ))
    }

    fn reject(&self, request: &InboundRequest, error: AdmissionError) -> ValidationResult {
        ldebug!(
            &request.request_id,
            LogStage::Admission,
            LogComponent::Validator,
            "admission_rejected",
            "请求未通过准入校验",
            path = %request.path,
            reason = %error,
            status = error.status_code().as_u16(),
            routes = self.routes.snapshot().len()
        );
        ValidationResult::Failure(error)
    }
}

/// 租户解析之后的准入判断
fn decide(
    route: RouteEntry,
    identity: Option<IdentityModel>,
) -> std::result::Result<(IdentityModel, RouteEntry), AdmissionError> {
    match identity {
        None if !route.is_open => Err(AdmissionError::TenantForbidden),
        None if route.is_partitioned => Err(AdmissionError::PartitionRequiredNoTenant),
        identity => Ok((identity.unwrap_or_default(), route)),
    }
}
