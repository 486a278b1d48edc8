//! Modbus 内存设备网关入口：加载配置、构建内存、启动各入口，收到停机信号后退出。

use mma_config::{AppConfig, build_memories};
use mma_gateway::bootstrap;
use mma_telemetry::{GatewayStats, init_tracing};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 初始化结构化日志
    init_tracing();
    // 读取 config.yaml（缺失时写出默认配置并退出）
    let config = AppConfig::from_env()?;

    let memories = Arc::new(build_memories(&config.memory)?);
    info!(
        target: "mma.boot",
        memories = memories.len(),
        default = memories.default_key(),
        "memories ready"
    );

    let stats = Arc::new(GatewayStats::new());
    let runtime = bootstrap::start(&config, memories, stats).await?;

    wait_for_shutdown().await;
    info!(target: "mma.boot", "shutdown signal received");
    runtime.stop().await;
    Ok(())
}

/// 等待 Ctrl+C，Unix 下同时等待 SIGTERM。
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(target: "mma.boot", "failed to install SIGTERM handler: {}", e);
                None
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match term_signal {
                    Some(mut sig) => {
                        sig.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
