//! 账户服务
//!
//! 启动数据库、Redis、JWT、API.IR 资源以及 HTTP 与指标服务，所有组件作为一个整体启动和关闭。

use std::sync::Arc;

use anyhow::{Context, Result};
use notify_shared::http::HttpServer;
use notify_shared::lifecycle::Orchestrator;
use notify_shared::observability;
use tokio::signal;
use tracing::{error, info};

use account_service::config::{AccountConfig, SERVICE_NAME};
use account_service::{Resources, routes};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let config = AccountConfig::load().context("Failed to load configuration")?;

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let guard = observability::init(&obs_config)?;

    info!(
        environment = %config.environment,
        addr = %config.server.addr(),
        "Starting {}...",
        SERVICE_NAME
    );

    let resources = Resources::from_config(&config);
    let http = Arc::new(HttpServer::new(
        "http-server",
        config.server.addr(),
        routes::router(resources.clone()),
    ));

    let mut orchestrator = resources
        .units()
        .into_iter()
        .fold(Orchestrator::new(SERVICE_NAME), Orchestrator::with_unit)
        .with_unit(http);
    if let Some(metrics_server) = guard.metrics_server() {
        orchestrator = orchestrator.with_unit(metrics_server);
    }

    if let Err(e) = orchestrator.run(shutdown_signal()).await {
        error!(
            unit = e.failed_unit().unwrap_or("unknown"),
            error = %e,
            "Service startup failed"
        );
        return Err(e.into());
    }

    info!("Service shutdown complete");
    Ok(())
}

/// 监听 Ctrl+C 和 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
