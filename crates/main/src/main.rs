//! 主应用程序入口
//!
//! 启动在线状态管理器与 Axum Web 服务，服务停止时一并关闭管理器。

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use application::ConnectionManager;
use config::AppConfig;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use web_api::{cors_layer, router, AppState, Collaborators};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    tracing::info!(config = %config.sanitize(), "配置加载完成");

    // 数据库只被协作方使用，连接失败不阻止启动
    let database_url = config.database.url.clone();
    let connect_timeout = Duration::from_millis(config.database.connect_timeout_ms);
    tokio::spawn(async move {
        infrastructure::ping_and_log(&database_url, connect_timeout).await;
    });

    let (presence, presence_task) = ConnectionManager::spawn(config.relay.command_buffer);
    let state = AppState::new(Arc::new(presence.clone()));

    let cors = cors_layer(&config.server.cors_origins).context("CORS 来源配置无效")?;
    let app = router(state, Collaborators::default()).layer(cors);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("无法监听 {}", config.bind_addr()))?;
    tracing::info!(addr = %listener.local_addr()?, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    presence.shutdown().await;
    presence_task.await?;
    tracing::info!("中继服务已停止");

    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "无法监听 Ctrl+C 信号");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig_term) => {
                sig_term.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "无法监听终止信号");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("接收到 Ctrl+C 信号，开始优雅停机..."),
        _ = terminate => tracing::info!("接收到终止信号，开始优雅停机..."),
    }
}
