//! # 测试辅助函数

use std::sync::Once;
use tracing::Level;

use crate::auth::{GatewayClaims, JwtAuthenticator};
use crate::config::AuthConfig;

static INIT: Once = Once::new();

/// 测试使用的 HS256 密钥
pub const TEST_JWT_SECRET: &str = "partition-gateway-test-secret";

/// 初始化测试日志
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 测试用认证配置
pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        issuer: None,
        audience: None,
        leeway_seconds: 0,
    }
}

/// 为组织签发一个一小时有效的 `Authorization` 头值
pub fn bearer_for(org: &str) -> String {
    let authenticator = JwtAuthenticator::new(&test_auth_config()).unwrap();
    let token = authenticator
        .issue(&GatewayClaims::new("tester", 3600).with_org(org))
        .unwrap();
    format!("Bearer {token}")
}
