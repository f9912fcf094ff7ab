use crate::{
    config::AppConfig,
    error::Result,
    linfo,
    logging::{LogComponent, LogStage},
    management::server::{ManagementServer, ManagementState},
    proxy::{server::ProxyServer, state::ProxyState},
};
use crate::{lerror, lwarn};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 优雅关闭等待上限
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// 两个端口共享的服务状态
pub struct SharedServices {
    pub proxy_state: ProxyState,
    pub management_state: ManagementState,
}

/// 创建服务器实例
///
/// 从配置构建管理服务器和代理服务器实例
fn create_servers(
    config: &AppConfig,
    services: SharedServices,
) -> (ManagementServer, ProxyServer) {
    let management = config.dual_port.management.http.clone();
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "management_listen_info",
        &format!(
            "[INFO] Management server will listen on {}:{}",
            management.host, management.port
        )
    );

    let proxy = config.dual_port.proxy.http.clone();
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "proxy_listen_info",
        &format!("[INFO] Proxy server will listen on {}:{}", proxy.host, proxy.port)
    );

    let management_server = ManagementServer::new(management, services.management_state);
    let proxy_server = ProxyServer::new(proxy, services.proxy_state, &config.gateway);

    (management_server, proxy_server)
}

/// 处理 Ctrl+C 信号
async fn handle_ctrl_c_signal() -> String {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "Ctrl+C signal".to_string(),
        Err(e) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::ServerSetup,
                "ctrl_c_error",
                &format!("Failed to listen for Ctrl+C: {e:?}")
            );
            "Ctrl+C handler error".to_string()
        }
    }
}

/// 处理服务器任务退出结果
fn handle_task_result(
    server_name: &str,
    result: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> String {
    match result {
        Ok(Err(e)) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::ServerSetup,
                &format!("{}_error", server_name.to_lowercase().replace(' ', "_")),
                &format!("{server_name} error: {e:?}")
            );
            format!("{server_name} error")
        }
        Err(e) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::ServerSetup,
                &format!("{}_panic", server_name.to_lowercase().replace(' ', "_")),
                &format!("{server_name} panicked: {e:?}")
            );
            format!("{server_name} panic")
        }
        Ok(Ok(())) => format!("{server_name} exit"),
    }
}

/// 等待关闭信号（Ctrl+C 或服务器退出）
async fn await_shutdown_reason(
    management_task: &mut JoinHandle<Result<()>>,
    proxy_task: &mut JoinHandle<Result<()>>,
) -> String {
    tokio::select! {
        reason = handle_ctrl_c_signal() => reason,
        result = management_task => {
            handle_task_result("Management server", result)
        },
        result = proxy_task => {
            handle_task_result("Proxy server", result)
        },
    }
}

/// 双端口服务器生命周期管理器
///
/// 两个服务器共用一个关闭令牌：令牌触发后停止接收新连接，处理中的请求继续完成。
pub struct DualPortServerManager {
    shutdown: CancellationToken,
}

impl Default for DualPortServerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DualPortServerManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
        }
    }

    /// 启动所有组件：管理服务器 → 代理服务器
    pub fn start_all(
        &self,
        management_server: ManagementServer,
        proxy_server: ProxyServer,
    ) -> (JoinHandle<Result<()>>, JoinHandle<Result<()>>) {
        let management_task = tokio::spawn(
            management_server.serve(self.shutdown.clone().cancelled_owned()),
        );
        let proxy_task = tokio::spawn(proxy_server.serve(self.shutdown.clone().cancelled_owned()));

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "all_components_started",
            "✅ All components started"
        );

        (management_task, proxy_task)
    }

    /// 优雅关闭：触发关闭令牌，等待两个服务器排空；超时后强制中止
    pub async fn shutdown_all(
        &self,
        management_task: JoinHandle<Result<()>>,
        proxy_task: JoinHandle<Result<()>>,
        shutdown_reason: &str,
    ) {
        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "shutdown_initiated",
            &format!("🛑 Graceful shutdown: {shutdown_reason}")
        );

        self.shutdown.cancel();

        for (name, task) in [("management", management_task), ("proxy", proxy_task)] {
            // 已经退出并被轮询过的任务不能再次等待
            if task.is_finished() {
                continue;
            }
            let abort = task.abort_handle();
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(result) => {
                    handle_task_result(name, result);
                }
                Err(_) => {
                    lwarn!(
                        "system",
                        LogStage::Shutdown,
                        LogComponent::ServerSetup,
                        "shutdown_timeout",
                        &format!("⚠️  {name} server did not drain in time, aborting"),
                        grace_secs = SHUTDOWN_GRACE.as_secs()
                    );
                    abort.abort();
                }
            }
        }
    }
}

/// 运行双端口服务器
///
/// 这是应用的主入口函数，负责：
/// 1. 初始化所有服务和状态
/// 2. 启动管理服务器和代理服务器
/// 3. 等待关闭信号（Ctrl+C 或服务器异常）
/// 4. 执行优雅关闭
pub async fn run_dual_port_servers(config: AppConfig) -> Result<()> {
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "start_servers",
        "🚀 Starting dual-port gateway servers..."
    );

    let services = initialize_services(&config).inspect_err(|err| {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "init_services_fail",
            "❌ 服务初始化失败",
            error = %err
        );
    })?;

    let (management_server, proxy_server) = create_servers(&config, services);
    let server_manager = DualPortServerManager::new();
    let (mut management_task, mut proxy_task) =
        server_manager.start_all(management_server, proxy_server);

    let shutdown_reason = await_shutdown_reason(&mut management_task, &mut proxy_task).await;
    server_manager
        .shutdown_all(management_task, proxy_task, &shutdown_reason)
        .await;

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::ServerSetup,
        "servers_stopped",
        "👋 All servers stopped. Goodbye!"
    );

    Ok(())
}

/// 初始化所有共享服务和状态
///
/// 路由表与服务发现在两个端口之间共享：管理端写入，代理端读取。
pub fn initialize_services(config: &AppConfig) -> Result<SharedServices> {
    let proxy_state = ProxyState::from_config(config)?;
    let management_state = ManagementState::new(proxy_state.routes(), proxy_state.discovery());

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "init_services_ok",
        "✅ Gateway services initialized",
        routes = config.routes.len(),
        services = config.discovery.services.len(),
        authenticated = config.auth.is_some()
    );

    Ok(SharedServices {
        proxy_state,
        management_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::route_table::RouteEntry;

    #[tokio::test]
    async fn services_share_one_route_table() {
        let mut config = AppConfig::default();
        config.routes = vec![RouteEntry::new("/orders", "svc:orders")];

        let services = initialize_services(&config).unwrap();
        services.management_state.routes.replace(Vec::new());

        assert!(services.proxy_state.routes().snapshot().is_empty());
    }

    #[test]
    fn task_results_are_described() {
        assert_eq!(handle_task_result("Proxy server", Ok(Ok(()))), "Proxy server exit");
        assert_eq!(
            handle_task_result(
                "Proxy server",
                Ok(Err(crate::error::ProxyError::internal("boom")))
            ),
            "Proxy server error"
        );
    }
}
