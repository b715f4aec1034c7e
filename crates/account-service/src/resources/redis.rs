//! Redis 客户端资源

use async_trait::async_trait;
use notify_shared::cache::Cache;
use notify_shared::config::RedisConfig;
use notify_shared::error::{Result, ServiceError};
use notify_shared::lifecycle::{Lifecycle, LifecycleState, StateCell};
use parking_lot::Mutex;
use tracing::info;

use crate::error::AccountError;

const NAME: &str = "redis";

pub struct RedisResource {
    config: RedisConfig,
    state: StateCell,
    cache: Mutex<Option<Cache>>,
}

impl RedisResource {
    pub fn new(config: RedisConfig) -> Self {
        Self {
            config,
            state: StateCell::new(NAME),
            cache: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn cache(&self) -> std::result::Result<Cache, AccountError> {
        self.cache
            .lock()
            .clone()
            .ok_or(AccountError::NotReady { resource: NAME })
    }

    pub async fn health_check(&self) -> std::result::Result<(), AccountError> {
        self.cache()?.health_check().await?;
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for RedisResource {
    fn name(&self) -> &str {
        NAME
    }

    /// 创建客户端并以 PING 验证连通性
    async fn start(&self) -> Result<()> {
        self.state.begin_start()?;

        let cache = match Cache::new(&self.config) {
            Ok(cache) => cache,
            Err(e) => {
                self.state.mark_failed();
                return Err(e);
            }
        };
        if let Err(e) = cache.health_check().await {
            self.state.mark_failed();
            return Err(e);
        }
        *self.cache.lock() = Some(cache);

        if !self.state.mark_running() {
            self.cache.lock().take();
            return Err(ServiceError::Cancelled {
                unit: NAME.to_string(),
            });
        }

        info!(resource = NAME, db = self.config.db, "Redis 资源已就绪");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.state.begin_close().is_none() {
            self.state.wait_closed().await;
            return Ok(());
        }
        // 多路复用连接随客户端一起释放
        if self.cache.lock().take().is_some() {
            info!(resource = NAME, "Redis 资源已释放");
        }
        self.state.mark_closed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_fails_start() {
        let resource = RedisResource::new(RedisConfig {
            url: "not-a-redis-url".to_string(),
            db: 0,
        });
        let err = resource.start().await.unwrap_err();
        assert_eq!(err.code(), "REDIS_ERROR");
        assert_eq!(resource.state(), LifecycleState::Failed);
        assert!(resource.cache().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_start() {
        let resource = RedisResource::new(RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            db: 0,
        });
        assert!(resource.start().await.is_err());
        assert_eq!(resource.state(), LifecycleState::Failed);

        resource.close().await.unwrap();
        resource.close().await.unwrap();
        assert_eq!(resource.state(), LifecycleState::Closed);
    }

    #[tokio::test]
    #[ignore] // 需要 Redis 连接
    async fn test_start_with_local_redis() {
        let resource = RedisResource::new(RedisConfig::default());
        resource.start().await.unwrap();
        resource.health_check().await.unwrap();
        resource.close().await.unwrap();
    }
}
