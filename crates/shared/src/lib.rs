//! 共享库
//!
//! 包含各服务共用的配置加载、错误处理、可观测性、组件生命周期编排，
//! 以及数据库与缓存连接等基础设施代码。

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use error::{Result, ServiceError};
pub use lifecycle::{Lifecycle, LifecycleState, Orchestrator, StateCell};
