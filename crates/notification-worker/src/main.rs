//! 通知服务
//!
//! 启动 gRPC / RabbitMQ 消费者与指标服务，所有组件作为一个整体启动和关闭。

use std::sync::Arc;

use anyhow::{Context, Result};
use notify_shared::lifecycle::Orchestrator;
use notify_shared::observability;
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{error, info};

use notification_worker::config::{SERVICE_NAME, WorkerConfig};
use notification_worker::consumer::{
    GrpcConsumer, GrpcConsumerSettings, RabbitConsumer, RabbitConsumerSettings,
};
use notification_worker::{Dispatcher, Registry};

fn main() -> Result<()> {
    // 单线程协作式调度；SMTP 等阻塞调用由 spawn_blocking 卸载
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run())
}

async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();

    // 1. 加载配置
    let config = WorkerConfig::load().context("Failed to load configuration")?;

    // 2. 初始化可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let guard = observability::init(&obs_config)?;

    info!(
        environment = %config.environment,
        grpc_enabled = config.consumers.grpc.enabled,
        rabbitmq_enabled = config.consumers.rabbitmq.enabled,
        "Starting {}...",
        SERVICE_NAME
    );

    // 3. 构建注册表与分发器
    let registry =
        Registry::from_config(&config.channels).context("Invalid channel configuration")?;
    let dispatcher = Dispatcher::new(Arc::new(registry), config.dispatch.unroutable);

    // 4. 组装组件
    let runtime = Handle::current();
    let mut orchestrator = Orchestrator::new(SERVICE_NAME);

    if let Some(metrics_server) = guard.metrics_server() {
        orchestrator = orchestrator.with_unit(metrics_server);
    }

    if config.consumers.grpc.enabled {
        let settings = GrpcConsumerSettings::from_config(&config.consumers.grpc, runtime.clone())?;
        orchestrator =
            orchestrator.with_unit(Arc::new(GrpcConsumer::new(settings, dispatcher.clone())));
    }

    if config.consumers.rabbitmq.enabled {
        let settings =
            RabbitConsumerSettings::from_config(&config.consumers.rabbitmq, runtime.clone())?;
        orchestrator =
            orchestrator.with_unit(Arc::new(RabbitConsumer::new(settings, dispatcher.clone())));
    }

    // 5. 启动并等待关闭信号
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

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
