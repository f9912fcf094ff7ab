//! # 配置管理器
//!
//! 从 TOML 文件加载配置，再应用 `GATEWAY_` 前缀的环境变量覆盖

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::AppConfig;
use crate::error::{ProxyError, Result};

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG_PATH";

const ENV_PREFIX: &str = "GATEWAY_";

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 当前配置
    config: AppConfig,
    /// 配置文件路径
    source: PathBuf,
    /// 生效的环境变量覆盖
    env_overrides: HashMap<String, String>,
}

impl ConfigManager {
    /// 创建配置管理器
    ///
    /// 路径优先级：显式参数 → `GATEWAY_CONFIG_PATH` → `config/config.{RUST_ENV}.toml`
    pub fn new(explicit_path: Option<&Path>) -> Result<Self> {
        Self::from_file(default_config_path(explicit_path))
    }

    /// 从指定文件创建，并应用进程环境变量覆盖
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_env(config_path, env::vars())
    }

    /// 从指定文件创建，使用给定的环境变量集合
    pub fn from_file_with_env(
        config_path: impl AsRef<Path>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let config_path = config_path.as_ref();
        let mut config = Self::load_config_file(config_path)?;

        let env_overrides = Self::build_env_overrides(vars);
        Self::apply_env_overrides(&mut config, &env_overrides)?;

        super::validate_config(&config)?;

        info!(
            path = %config_path.display(),
            overrides = env_overrides.len(),
            routes = config.routes.len(),
            services = config.discovery.services.len(),
            "配置加载完成"
        );

        Ok(Self {
            config,
            source: config_path.to_path_buf(),
            env_overrides,
        })
    }

    /// 获取当前配置
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 取出配置
    #[must_use]
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// 配置文件路径
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// 生效的环境变量覆盖数
    #[must_use]
    pub fn override_count(&self) -> usize {
        self.env_overrides.len()
    }

    /// 加载配置文件
    fn load_config_file(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            return Err(ProxyError::config(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        }

        let config_content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
        })?;

        toml::from_str(&config_content).map_err(|e| {
            ProxyError::config_with_source(
                format!("TOML解析失败 - 配置文件: {}, 详细错误: {e}", path.display()),
                e,
            )
        })
    }

    /// 构建环境变量覆盖映射
    ///
    /// 例如 `GATEWAY_PROXY_PORT` → `proxy.port`
    fn build_env_overrides(
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> HashMap<String, String> {
        let overrides: HashMap<String, String> = vars
            .into_iter()
            .filter(|(key, _)| key != CONFIG_PATH_ENV)
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .map(|config_key| (config_key.to_lowercase().replace('_', "."), value))
            })
            .collect();

        debug!("发现 {} 个环境变量覆盖", overrides.len());
        overrides
    }

    /// 应用环境变量覆盖
    fn apply_env_overrides(
        config: &mut AppConfig,
        overrides: &HashMap<String, String>,
    ) -> Result<()> {
        for (path, value) in overrides {
            debug!(
                "应用环境变量覆盖: {} = {}",
                path,
                if path.contains("secret") { "***" } else { value }
            );
            Self::apply_override_to_config(config, path, value)?;
        }
        Ok(())
    }

    /// 将环境变量覆盖应用到配置对象
    fn apply_override_to_config(config: &mut AppConfig, path: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["proxy", "host"] => config.dual_port.proxy.http.host = value.to_string(),
            ["proxy", "port"] => config.dual_port.proxy.http.port = parse(path, value)?,
            ["management", "host"] => config.dual_port.management.http.host = value.to_string(),
            ["management", "port"] => config.dual_port.management.http.port = parse(path, value)?,
            ["gateway", "host", "name"] | ["gateway", "hostname"] => {
                config.gateway.host_name = value.to_string();
            }
            ["gateway", "path", "base"] | ["gateway", "pathbase"] => {
                config.gateway.path_base = Some(value.to_string()).filter(|base| !base.is_empty());
            }
            ["retry", "max", "retries"] | ["retry", "maxretries"] => {
                config.retry.max_retries = parse(path, value)?;
            }
            ["auth", "jwt", "secret"] | ["auth", "jwtsecret"] => match &mut config.auth {
                Some(auth) => auth.jwt_secret = value.to_string(),
                None => {
                    config.auth = Some(super::AuthConfig {
                        jwt_secret: value.to_string(),
                        issuer: None,
                        audience: None,
                        leeway_seconds: 0,
                    });
                }
            },
            _ => {
                warn!("未知的配置路径，忽略环境变量覆盖: {}", path);
            }
        }

        Ok(())
    }
}

/// 解析默认配置文件路径
#[must_use]
pub fn default_config_path(explicit_path: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit_path {
        return path.to_path_buf();
    }
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    PathBuf::from(format!("config/config.{env}.toml"))
}

fn parse<T>(path: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse().map_err(|e| {
        ProxyError::config_with_source(format!("环境变量覆盖 {path} 的值无效: {value}"), e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SAMPLE: &str = r#"
[dual_port.proxy.http]
host = "0.0.0.0"
port = 8080

[dual_port.management.http]
host = "127.0.0.1"
port = 9090

[gateway]
host_name = "gw-1"
path_base = "/api"

[retry]
max_retries = 3

[tenant]
resolver = "static"
organization_prefix = "acme"

[[routes]]
pathMatcher = "/orders"
isPartitioned = true
serviceUri = "svc:orders"

[[discovery.services]]
service_uri = "svc:orders"

[[discovery.services.partitions]]
low_key = 0
high_key = 127
listeners = { "" = "http://10.0.0.5:8080" }
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn loads_sections_from_toml() {
        let file = write_config(SAMPLE);
        let manager = ConfigManager::from_file_with_env(file.path(), vars(&[])).unwrap();
        let config = manager.config();

        assert_eq!(config.gateway.host_name, "gw-1");
        assert_eq!(config.gateway.path_base.as_deref(), Some("/api"));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.routes.len(), 1);
        assert!(config.routes[0].is_partitioned);
        assert!(!config.routes[0].is_open);
        assert_eq!(config.discovery.services[0].partitions[0].high_key, Some(127));
        assert_eq!(
            config.tenant.static_identity().unwrap().organization_prefix(),
            "acme"
        );
        assert!(config.auth.is_none());
    }

    #[test]
    fn env_overrides_are_applied() {
        let file = write_config(SAMPLE);
        let manager = ConfigManager::from_file_with_env(
            file.path(),
            vars(&[
                ("GATEWAY_PROXY_PORT", "18080"),
                ("GATEWAY_GATEWAY_HOST_NAME", "edge-gw"),
                ("GATEWAY_AUTH_JWT_SECRET", "s3cret"),
                ("GATEWAY_CONFIG_PATH", "/ignored.toml"),
                ("UNRELATED", "x"),
            ]),
        )
        .unwrap();

        let config = manager.config();
        assert_eq!(config.dual_port.proxy.http.port, 18080);
        assert_eq!(config.gateway.host_name, "edge-gw");
        assert_eq!(config.auth.as_ref().unwrap().jwt_secret, "s3cret");
        assert_eq!(manager.override_count(), 3);
    }

    #[test]
    fn invalid_override_value_is_a_config_error() {
        let file = write_config(SAMPLE);
        let err = ConfigManager::from_file_with_env(
            file.path(),
            vars(&[("GATEWAY_PROXY_PORT", "not-a-port")]),
        )
        .unwrap_err();
        assert!(matches!(err, ProxyError::Config { .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ConfigManager::from_file_with_env("/definitely/missing.toml", vars(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("配置文件不存在"));
    }

    #[test]
    fn explicit_path_wins() {
        assert_eq!(
            default_config_path(Some(Path::new("custom.toml"))),
            PathBuf::from("custom.toml")
        );
    }
}
