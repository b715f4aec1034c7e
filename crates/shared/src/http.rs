//! HTTP 服务组件
//!
//! 将 axum Router 封装为可编排组件：`start()` 完成端口绑定后立即返回，
//! 请求处理在后台任务中进行；`close()` 触发优雅关闭并等待后台任务退出。

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{Result, ServiceError};
use crate::lifecycle::{Lifecycle, StateCell};

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// 可编排的 HTTP 服务
pub struct HttpServer {
    name: String,
    addr: String,
    router: Router,
    state: StateCell,
    running: Mutex<Option<Running>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl HttpServer {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, router: Router) -> Self {
        let name = name.into();
        Self {
            state: StateCell::new(name.clone()),
            name,
            addr: addr.into(),
            router,
            running: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// 实际监听地址（绑定 0 端口时用于获取系统分配的端口）
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(Running { shutdown, task }) = running {
            let _ = shutdown.send(());
            if let Err(e) = task.await {
                warn!(unit = %self.name, error = %e, "HTTP 服务任务退出异常");
            }
            info!(unit = %self.name, "HTTP 服务已停止");
        }
    }
}

#[async_trait]
impl Lifecycle for HttpServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        self.state.begin_start()?;

        let listener = match TcpListener::bind(&self.addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state.mark_failed();
                return Err(ServiceError::transport("http", format!("绑定 {} 失败: {e}", self.addr)));
            }
        };
        let local_addr = listener.local_addr().map_err(|e| {
            self.state.mark_failed();
            ServiceError::from(e)
        })?;

        let (tx, rx) = oneshot::channel::<()>();
        let router = self.router.clone();
        let name = self.name.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(unit = %name, error = %e, "HTTP 服务异常退出");
            }
        });

        *self.local_addr.lock() = Some(local_addr);
        *self.running.lock() = Some(Running { shutdown: tx, task });

        if !self.state.mark_running() {
            self.stop().await;
            return Err(ServiceError::Cancelled {
                unit: self.name.clone(),
            });
        }

        info!(unit = %self.name, addr = %local_addr, "HTTP 服务已启动");
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
