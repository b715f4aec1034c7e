//! 后端资源
//!
//! 每个资源持有一个 [`StateCell`](notify_shared::lifecycle::StateCell)，
//! `start()` 建立连接，`close()` 释放连接且可重复调用。资源未启动时访问返回
//! [`AccountError::NotReady`](crate::error::AccountError::NotReady)。

pub mod api_ir;
pub mod database;
pub mod jwt;
pub mod redis;

pub use api_ir::ApiIrResource;
pub use database::DatabaseResource;
pub use jwt::{Claims, JwtResource, TokenPair, TokenType};
pub use redis::RedisResource;

use std::sync::Arc;

use notify_shared::lifecycle::Lifecycle;

use crate::config::AccountConfig;

/// 账户服务的全部后端资源
#[derive(Clone)]
pub struct Resources {
    pub database: Arc<DatabaseResource>,
    pub redis: Arc<RedisResource>,
    pub jwt: Arc<JwtResource>,
    pub api_ir: Arc<ApiIrResource>,
}

impl Resources {
    pub fn from_config(config: &AccountConfig) -> Self {
        Self {
            database: Arc::new(DatabaseResource::new(config.database.clone())),
            redis: Arc::new(RedisResource::new(config.redis.clone())),
            jwt: Arc::new(JwtResource::new(config.jwt.clone())),
            api_ir: Arc::new(ApiIrResource::new(config.api_ir.clone())),
        }
    }

    /// 以可编排组件的形式返回全部资源（固定顺序）
    pub fn units(&self) -> Vec<Arc<dyn Lifecycle>> {
        vec![
            self.database.clone(),
            self.redis.clone(),
            self.jwt.clone(),
            self.api_ir.clone(),
        ]
    }
}
