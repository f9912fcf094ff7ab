//! # 调用方身份模型
//!
//! 租户解析的结果。以 base64(JSON) 的形式放入 `x-identity-model` 头转发给后端，
//! 字段名使用 `PascalCase`，与后端既有的反序列化约定保持一致。

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 转发身份信息使用的请求头
pub const IDENTITY_HEADER: &str = "x-identity-model";

/// 已解析的调用方身份，构造后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdentityModel {
    id: i64,
    organization_prefix: String,
    username: String,
    entity_id: String,
    current_organization_id: i64,
    originating_tenant_guid: Option<String>,
    originating_tenant_id: i64,
    language: String,
}

impl Default for IdentityModel {
    fn default() -> Self {
        Self::empty()
    }
}

impl IdentityModel {
    /// 默认语言
    pub const DEFAULT_LANGUAGE: &'static str = "en-us";

    /// 创建身份
    pub fn create(
        organization_prefix: impl Into<String>,
        username: impl Into<String>,
        entity_id: impl Into<String>,
        language: Option<&str>,
    ) -> Self {
        Self {
            id: 0,
            organization_prefix: organization_prefix.into(),
            username: username.into(),
            entity_id: entity_id.into(),
            current_organization_id: 0,
            originating_tenant_guid: None,
            originating_tenant_id: 0,
            language: language.unwrap_or(Self::DEFAULT_LANGUAGE).to_string(),
        }
    }

    /// "无租户" 哨兵值，用于开放且非分区的路由
    #[must_use]
    pub fn empty() -> Self {
        Self::create("", "", "", None)
    }

    /// 是否为空哨兵
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// 设置数值 ID
    #[must_use]
    pub const fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// 设置当前/源租户信息
    #[must_use]
    pub fn with_tenancy(
        mut self,
        current_organization_id: i64,
        originating_tenant_id: i64,
        originating_tenant_guid: Option<String>,
    ) -> Self {
        self.current_organization_id = current_organization_id;
        self.originating_tenant_id = originating_tenant_id;
        self.originating_tenant_guid = originating_tenant_guid;
        self
    }

    /// 数值 ID
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// 组织前缀（分区键来源）
    #[must_use]
    pub fn organization_prefix(&self) -> &str {
        &self.organization_prefix
    }

    /// 用户名
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// 实体 ID
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// 当前组织 ID
    #[must_use]
    pub const fn current_organization_id(&self) -> i64 {
        self.current_organization_id
    }

    /// 源租户 ID
    #[must_use]
    pub const fn originating_tenant_id(&self) -> i64 {
        self.originating_tenant_id
    }

    /// 源租户 GUID
    #[must_use]
    pub fn originating_tenant_guid(&self) -> Option<&str> {
        self.originating_tenant_guid.as_deref()
    }

    /// 语言
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// 编码为 `x-identity-model` 头的值
    pub fn to_header_value(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(STANDARD.encode(json.as_bytes()))
    }

    /// 从 `x-identity-model` 头的值解码
    pub fn from_header_value(value: &str) -> Result<Self> {
        let bytes = STANDARD.decode(value.trim()).map_err(|e| {
            crate::error::ProxyError::validation(
                format!("x-identity-model 不是合法的 base64: {e}"),
                Some(IDENTITY_HEADER.to_string()),
            )
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_sentinel_has_default_language() {
        let empty = IdentityModel::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.language(), "en-us");
        assert_eq!(empty.organization_prefix(), "");
        assert!(!IdentityModel::create("acme", "bob", "e-1", None).is_empty());
    }

    #[test]
    fn header_value_is_base64_pascal_case_json() {
        let identity = IdentityModel::create("acme", "bob", "e-1", Some("nb-no")).with_id(7);
        let encoded = identity.to_header_value().unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&STANDARD.decode(&encoded).unwrap()).unwrap();
        assert_eq!(json["OrganizationPrefix"], "acme");
        assert_eq!(json["Username"], "bob");
        assert_eq!(json["Id"], 7);
        assert_eq!(json["Language"], "nb-no");
        assert!(json["OriginatingTenantGuid"].is_null());

        assert_eq!(IdentityModel::from_header_value(&encoded).unwrap(), identity);
    }
}
