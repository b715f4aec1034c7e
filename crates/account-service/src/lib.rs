//! 账户服务
//!
//! 账户服务依赖的后端资源（数据库、Redis、JWT 签名器、API.IR 客户端）均实现
//! [`notify_shared::lifecycle::Lifecycle`]，与 HTTP 服务一起由 Orchestrator 统一启动和关闭。

pub mod config;
pub mod error;
pub mod resources;
pub mod routes;

pub use config::AccountConfig;
pub use error::AccountError;
pub use resources::Resources;
