//! 生命周期编排模块
//!
//! 将多个相互独立的组件（传输层消费者、数据库连接、缓存客户端、HTTP 服务等）
//! 作为一个整体启动和关闭：
//!
//! - 所有组件的 `start()` 并发执行，任一失败则取消其余启动任务，
//!   对全部组件执行 `close()` 回滚，并返回标明失败组件的启动错误。
//! - 关闭阶段并发关闭所有组件，单个组件关闭失败（包括 panic）只记录日志并计数，
//!   不阻塞其他组件。

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ServiceError};

/// 可编排组件
///
/// `close()` 必须可以在任意状态下调用（包括从未启动、启动中被取消），
/// 且多次调用是幂等的：并发的第二次调用在第一次关闭完成后才返回。
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// 组件名称（用于日志和启动错误定位）
    fn name(&self) -> &str;

    /// 建立连接或监听，成功返回后组件即处于可服务状态
    async fn start(&self) -> Result<()>;

    /// 释放组件持有的资源
    async fn close(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// 组件状态机
// ---------------------------------------------------------------------------

/// 组件生命周期状态
///
/// `Created → Starting → Running → Closing → Closed`，启动失败时 `Starting → Failed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Starting,
    Running,
    Closing,
    Closed,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 线程安全的状态单元，供各组件实现状态迁移规则
#[derive(Debug)]
pub struct StateCell {
    unit: String,
    state: Mutex<LifecycleState>,
    closed: Notify,
}

impl StateCell {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            state: Mutex::new(LifecycleState::Created),
            closed: Notify::new(),
        }
    }

    pub fn get(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// `Created → Starting`，其他状态下调用 start 视为非法
    pub fn begin_start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != LifecycleState::Created {
            return Err(ServiceError::InvalidState {
                unit: self.unit.clone(),
                state: state.to_string(),
                operation: "start".to_string(),
            });
        }
        *state = LifecycleState::Starting;
        Ok(())
    }

    /// `Starting → Running`
    ///
    /// 返回 false 表示启动期间组件已被关闭，调用方需放弃本次启动。
    pub fn mark_running(&self) -> bool {
        let mut state = self.state.lock();
        if *state == LifecycleState::Starting {
            *state = LifecycleState::Running;
            true
        } else {
            false
        }
    }

    /// `Starting → Failed`
    pub fn mark_failed(&self) {
        let mut state = self.state.lock();
        if *state == LifecycleState::Starting {
            *state = LifecycleState::Failed;
        }
    }

    /// 进入 `Closing`
    ///
    /// 返回之前的状态；若组件已处于 `Closing`/`Closed` 则返回 None，
    /// 调用方应通过 [`StateCell::wait_closed`] 等待正在进行的关闭完成。
    pub fn begin_close(&self) -> Option<LifecycleState> {
        let mut state = self.state.lock();
        match *state {
            LifecycleState::Closing | LifecycleState::Closed => None,
            previous => {
                *state = LifecycleState::Closing;
                Some(previous)
            }
        }
    }

    /// 任意状态 → `Closed`
    pub fn mark_closed(&self) {
        *self.state.lock() = LifecycleState::Closed;
        self.closed.notify_waiters();
    }

    /// 等待组件进入 `Closed`
    pub async fn wait_closed(&self) {
        loop {
            let notified = self.closed.notified();
            tokio::pin!(notified);
            // 先注册再检查状态，避免错过 mark_closed 的通知
            notified.as_mut().enable();
            if self.get() == LifecycleState::Closed {
                return;
            }
            notified.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// 全有或全无的组件编排器
///
/// 组件在构造时以固定顺序注册，编排器本身不持有可变状态。
pub struct Orchestrator {
    service: String,
    units: Vec<Arc<dyn Lifecycle>>,
}

impl Orchestrator {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            units: Vec::new(),
        }
    }

    /// 注册一个组件
    pub fn with_unit(mut self, unit: Arc<dyn Lifecycle>) -> Self {
        self.units.push(unit);
        self
    }

    /// 已注册组件名称（按注册顺序）
    pub fn unit_names(&self) -> Vec<String> {
        self.units.iter().map(|u| u.name().to_string()).collect()
    }

    /// 并发启动全部组件
    ///
    /// 任一组件启动失败时：中止其余仍在进行的启动任务并等待其结束，
    /// 随后对所有组件执行 close，最后返回 `ServiceError::Startup`。
    pub async fn start(&self) -> Result<()> {
        info!(service = %self.service, units = ?self.unit_names(), "开始启动组件");

        let mut tasks = JoinSet::new();
        let mut names = HashMap::with_capacity(self.units.len());
        for unit in &self.units {
            let unit = Arc::clone(unit);
            let name = unit.name().to_string();
            let handle = tasks.spawn(async move { unit.start().await });
            names.insert(handle.id(), name);
        }

        let unit_name = |id: &tokio::task::Id| {
            names
                .get(id)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string())
        };

        let mut failure = None;
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, Ok(()))) => {
                    debug!(service = %self.service, unit = %unit_name(&id), "组件启动完成");
                }
                Ok((id, Err(e))) => {
                    failure = Some(ServiceError::Startup {
                        unit: unit_name(&id),
                        source: Box::new(e),
                    });
                    break;
                }
                Err(join_error) => {
                    let unit = unit_name(&join_error.id());
                    let source = if join_error.is_panic() {
                        ServiceError::Internal(format!("{unit} 启动任务 panic"))
                    } else {
                        ServiceError::Cancelled { unit: unit.clone() }
                    };
                    failure = Some(ServiceError::Startup {
                        unit,
                        source: Box::new(source),
                    });
                    break;
                }
            }
        }

        let Some(err) = failure else {
            info!(service = %self.service, "全部组件启动成功");
            return Ok(());
        };

        error!(
            service = %self.service,
            unit = err.failed_unit().unwrap_or("unknown"),
            error = %err,
            cause = %std::error::Error::source(&err).map(|s| s.to_string()).unwrap_or_default(),
            "组件启动失败，开始回滚"
        );

        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            if let Err(join_error) = joined
                && join_error.is_panic()
            {
                warn!(service = %self.service, "回滚期间启动任务 panic");
            }
        }

        self.close_all().await;
        Err(err)
    }

    /// 并发关闭全部组件，返回关闭失败的组件数量
    pub async fn shutdown(&self) -> usize {
        info!(service = %self.service, "开始关闭组件");
        let failed = self.close_all().await;
        if failed == 0 {
            info!(service = %self.service, "全部组件已关闭");
        } else {
            warn!(service = %self.service, failed, "部分组件关闭失败");
        }
        failed
    }

    /// 启动全部组件，等待外部关闭信号后关闭全部组件
    pub async fn run<F>(&self, shutdown_signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        info!(service = %self.service, "服务运行中，等待关闭信号");
        shutdown_signal.await;
        self.shutdown().await;
        Ok(())
    }

    async fn close_all(&self) -> usize {
        let closes = self.units.iter().map(|unit| async move {
            let result = match AssertUnwindSafe(unit.close()).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Internal(format!("{} 关闭时 panic", unit.name()))),
            };
            (unit.name().to_string(), result)
        });

        let mut failed = 0;
        for (unit, result) in futures::future::join_all(closes).await {
            if let Err(e) = result {
                failed += 1;
                error!(service = %self.service, unit = %unit, error = %e, "组件关闭失败");
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_cell_happy_path() {
        let cell = StateCell::new("unit");
        assert_eq!(cell.get(), LifecycleState::Created);

        cell.begin_start().unwrap();
        assert_eq!(cell.get(), LifecycleState::Starting);
        assert!(cell.mark_running());
        assert_eq!(cell.get(), LifecycleState::Running);

        assert_eq!(cell.begin_close(), Some(LifecycleState::Running));
        cell.mark_closed();
        assert_eq!(cell.get(), LifecycleState::Closed);
    }

    #[test]
    fn test_state_cell_start_only_once() {
        let cell = StateCell::new("unit");
        cell.begin_start().unwrap();
        let err = cell.begin_start().unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[test]
    fn test_state_cell_close_is_idempotent() {
        let cell = StateCell::new("unit");
        assert_eq!(cell.begin_close(), Some(LifecycleState::Created));
        cell.mark_closed();
        assert_eq!(cell.begin_close(), None);
        assert_eq!(cell.get(), LifecycleState::Closed);
    }

    #[test]
    fn test_state_cell_failed_start() {
        let cell = StateCell::new("unit");
        cell.begin_start().unwrap();
        cell.mark_failed();
        assert_eq!(cell.get(), LifecycleState::Failed);
        assert_eq!(cell.begin_close(), Some(LifecycleState::Failed));
    }

    #[test]
    fn test_mark_running_after_close_is_rejected() {
        let cell = StateCell::new("unit");
        cell.begin_start().unwrap();
        cell.begin_close();
        assert!(!cell.mark_running());
    }

    #[tokio::test]
    async fn test_second_close_waits_for_first() {
        let cell = Arc::new(StateCell::new("unit"));
        assert_eq!(cell.begin_close(), Some(LifecycleState::Created));
        assert_eq!(cell.begin_close(), None);

        let waiter = tokio::spawn({
            let cell = Arc::clone(&cell);
            async move { cell.wait_closed().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        cell.mark_closed();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_closed_returns_when_already_closed() {
        let cell = StateCell::new("unit");
        cell.begin_close();
        cell.mark_closed();
        tokio::time::timeout(std::time::Duration::from_secs(1), cell.wait_closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_orchestrator_starts() {
        let orchestrator = Orchestrator::new("empty");
        assert!(orchestrator.unit_names().is_empty());
        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.shutdown().await, 0);
    }
}
