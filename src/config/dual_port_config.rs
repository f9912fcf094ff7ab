//! # 双端口配置
//!
//! 代理端口面向外部调用方，管理端口只在内网暴露路由表管理接口。

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{ProxyError, Result};

/// 双端口服务器配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualPortServerConfig {
    /// 管理服务配置
    #[serde(default)]
    pub management: ManagementPortConfig,
    /// 代理服务配置
    #[serde(default)]
    pub proxy: ProxyPortConfig,
}

/// 管理端口配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementPortConfig {
    /// HTTP 监听配置
    pub http: ListenerConfig,
}

/// 代理端口配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyPortConfig {
    /// HTTP 监听配置
    pub http: ListenerConfig,
}

/// 监听器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ManagementPortConfig {
    fn default() -> Self {
        Self {
            http: ListenerConfig {
                host: "127.0.0.1".to_string(),
                port: 9090,
            },
        }
    }
}

impl Default for ProxyPortConfig {
    fn default() -> Self {
        Self {
            http: ListenerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
        }
    }
}

impl ListenerConfig {
    /// 获取绑定地址
    pub fn bind_address(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|e| ProxyError::config_with_source(format!("无效的监听地址 '{addr}'"), e))
    }
}

impl DualPortServerConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        let mgmt_port = self.management.http.port;
        let proxy_port = self.proxy.http.port;

        // 端口 0 表示由系统分配，不算冲突
        if mgmt_port != 0 && mgmt_port == proxy_port {
            return Err(ProxyError::config(format!(
                "管理端口 ({mgmt_port}) 与代理端口 ({proxy_port}) 冲突"
            )));
        }

        self.management.http.bind_address()?;
        self.proxy.http.bind_address()?;
        Ok(())
    }

    /// 获取所有监听地址
    #[must_use]
    pub fn get_all_listeners(&self) -> Vec<(String, SocketAddr)> {
        let mut listeners = Vec::new();

        if let Ok(addr) = self.management.http.bind_address() {
            listeners.push(("management-http".to_string(), addr));
        }
        if let Ok(addr) = self.proxy.http.bind_address() {
            listeners.push(("proxy-http".to_string(), addr));
        }

        listeners
    }
}
