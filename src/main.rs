//! # Partition Gateway 主程序
//!
//! 分区感知 API 网关：代理端口对外，管理端口对内。

use clap::Parser;
use partition_gateway::{
    Result,
    config::load_config,
    dual_port_setup, lerror, linfo,
    logging::{self, LogComponent, LogStage},
};
use std::path::PathBuf;

/// 命令行参数
#[derive(Debug, Parser)]
#[command(name = "partition-gateway", version, about)]
struct Cli {
    /// 配置文件路径（默认 `config/config.{RUST_ENV}.toml`，可由 `GATEWAY_CONFIG_PATH` 覆盖）
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 日志级别，`RUST_LOG` 优先
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// 打印日志配置指南后退出
    #[arg(long)]
    log_help: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.log_help {
        logging::print_logging_help();
        return Ok(());
    }

    // 初始化日志系统
    logging::init_optimized_logging(cli.log_level.as_ref());

    let config = load_config(cli.config.as_deref()).inspect_err(|e| {
        lerror!(
            "system",
            LogStage::Configuration,
            LogComponent::Main,
            "config_load_failed",
            &format!("配置加载失败: {e:?}")
        );
    })?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动"
    );
    if let Err(e) = dual_port_setup::run_dual_port_servers(config).await {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            &format!("服务启动失败: {e:?}")
        );
        std::process::exit(1);
    }

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "service_shutdown",
        "服务正常关闭"
    );
    Ok(())
}
