use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediagrab_backend::api;
use mediagrab_backend::config::{self, AppConfig};
use mediagrab_backend::state::AppState;
use mediagrab_backend::tools::ToolSet;

/// Console + log file output / 控制台与日志文件输出
fn init_tracing(app_config: &AppConfig) -> anyhow::Result<()> {
    let log_path = app_config.get_logs_dir().join("app.log");
    let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediagrab_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM / 等待退出信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration / 加载配置
    let app_config = config::load_config().map_err(anyhow::Error::msg)?;

    // Create logs/temp/downloads directories / 创建运行目录
    app_config.ensure_dirs()?;
    init_tracing(&app_config)?;
    tracing::info!("Server will listen on {}:{}", app_config.server.host, app_config.server.port);

    let tools = ToolSet::from_config(&app_config.tools);
    let state = Arc::new(AppState::new(app_config.clone(), tools));

    // Startup sweep / 启动时清理过期文件
    let sweeper = state.task_manager.sweeper().clone();
    let max_age = app_config.max_age();
    sweeper.cleanup_old_files(max_age).await;
    let periodic = app_config
        .sweep_interval()
        .map(|interval| sweeper.spawn_periodic(interval, max_age));

    let app = api::app_router(state);

    let bind_addr = app_config.get_bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Shutdown sweep / 退出前再清理一次
    tracing::info!("Shutting down");
    if let Some(handle) = periodic {
        handle.abort();
    }
    sweeper.cleanup_old_files(max_age).await;

    Ok(())
}
