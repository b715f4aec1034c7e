//! gRPC 消费者
//!
//! 暴露 `notification.NotificationService/SendNotification`。处理结果一律转换为
//! `Ack { success }` 回复，错误（包括 panic）不会穿过传输边界。

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use notify_proto::notification::notification_service_server::{
    NotificationService, NotificationServiceServer,
};
use notify_proto::notification::{Ack, NotificationRequest};
use notify_shared::error::{Result, ServiceError};
use notify_shared::lifecycle::{Lifecycle, LifecycleState, StateCell};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use super::{Consumer, process_payload};
use crate::config::GrpcConfig;
use crate::dispatcher::Dispatcher;
use crate::error::NotificationError;

const TRANSPORT: &str = "grpc";

/// gRPC 消费者设置（构造前完成校验，之后不可变）
#[derive(Debug, Clone)]
pub struct GrpcConsumerSettings {
    pub addr: SocketAddr,
    /// 后台服务任务所在的运行时
    pub runtime: Handle,
}

impl GrpcConsumerSettings {
    pub fn from_config(
        config: &GrpcConfig,
        runtime: Handle,
    ) -> std::result::Result<Self, NotificationError> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| NotificationError::InvalidSettings(format!("gRPC 监听地址无效: {e}")))?;
        Ok(Self { addr, runtime })
    }
}

// ==================== gRPC 服务实现 ====================

#[derive(Clone)]
pub struct NotificationGrpcService {
    dispatcher: Dispatcher,
}

impl NotificationGrpcService {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[tonic::async_trait]
impl NotificationService for NotificationGrpcService {
    async fn send_notification(
        &self,
        request: Request<NotificationRequest>,
    ) -> std::result::Result<Response<Ack>, Status> {
        let payload = request.into_inner().payload_json;

        let outcome = AssertUnwindSafe(process_payload(
            &self.dispatcher,
            TRANSPORT,
            payload.as_bytes(),
        ))
        .catch_unwind()
        .await;

        let success = match outcome {
            Ok(result) => result.is_ok(),
            Err(_) => {
                error!(transport = TRANSPORT, "处理通知时发生 panic");
                false
            }
        };

        Ok(Response::new(Ack { success }))
    }
}

// ==================== 消费者 ====================

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct GrpcConsumer {
    settings: GrpcConsumerSettings,
    dispatcher: Dispatcher,
    state: StateCell,
    running: Mutex<Option<Running>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl GrpcConsumer {
    pub fn new(settings: GrpcConsumerSettings, dispatcher: Dispatcher) -> Self {
        Self {
            settings,
            dispatcher,
            state: StateCell::new("grpc-consumer"),
            running: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// 实际监听地址（配置端口为 0 时由系统分配）
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(Running { shutdown, task }) = running {
            let _ = shutdown.send(());
            if let Err(e) = task.await {
                warn!(transport = TRANSPORT, error = %e, "gRPC 服务任务退出异常");
            }
            info!(transport = TRANSPORT, "gRPC 服务已停止");
        }
    }
}

#[async_trait]
impl Lifecycle for GrpcConsumer {
    fn name(&self) -> &str {
        "grpc-consumer"
    }

    async fn start(&self) -> Result<()> {
        self.state.begin_start()?;

        let listener = match TcpListener::bind(self.settings.addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state.mark_failed();
                return Err(ServiceError::transport(
                    TRANSPORT,
                    format!("绑定 {} 失败: {e}", self.settings.addr),
                ));
            }
        };
        let local_addr = listener.local_addr().map_err(|e| {
            self.state.mark_failed();
            ServiceError::from(e)
        })?;

        let service = NotificationServiceServer::new(NotificationGrpcService::new(
            self.dispatcher.clone(),
        ));
        let (tx, rx) = oneshot::channel::<()>();
        let task = self.settings.runtime.spawn(async move {
            let result = Server::builder()
                .add_service(service)
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                    let _ = rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(transport = TRANSPORT, error = %e, "gRPC 服务异常退出");
            }
        });

        *self.local_addr.lock() = Some(local_addr);
        *self.running.lock() = Some(Running { shutdown: tx, task });

        if !self.state.mark_running() {
            self.stop().await;
            return Err(ServiceError::Cancelled {
                unit: self.name().to_string(),
            });
        }

        info!(transport = TRANSPORT, addr = %local_addr, "gRPC 消费者已启动");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.state.begin_close().is_none() {
            self.state.wait_closed().await;
            return Ok(());
        }
        self.stop().await;
        self.state.mark_closed();
        Ok(())
    }
}

impl Consumer for GrpcConsumer {
    fn transport(&self) -> &'static str {
        TRANSPORT
    }

    fn state(&self) -> LifecycleState {
        self.state.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settings_from_config() {
        let config = GrpcConfig {
            host: "127.0.0.1".to_string(),
            port: 50052,
            ..GrpcConfig::default()
        };
        let settings = GrpcConsumerSettings::from_config(&config, Handle::current()).unwrap();
        assert_eq!(settings.addr.port(), 50052);
    }

    #[tokio::test]
    async fn test_invalid_host_rejected() {
        let config = GrpcConfig {
            host: "not a host".to_string(),
            ..GrpcConfig::default()
        };
        let err = GrpcConsumerSettings::from_config(&config, Handle::current()).unwrap_err();
        assert_eq!(err.code(), "INVALID_SETTINGS");
    }
}
