//! Redis 缓存管理模块
//!
//! 提供 Redis 连接管理与健康检查。

use crate::config::RedisConfig;
use crate::error::{Result, ServiceError};
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::info;

/// Redis 缓存客户端
#[derive(Clone)]
pub struct Cache {
    client: Client,
    db: i64,
}

impl Cache {
    /// 创建 Redis 客户端（仅解析 URL，不建立连接）
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!(db = config.db, "Redis client created");
        Ok(Self {
            client,
            db: config.db,
        })
    }

    /// 获取多路复用连接，并切换到配置的逻辑库
    pub async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(ServiceError::from)?;
        if self.db != 0 {
            redis::cmd("SELECT")
                .arg(self.db)
                .query_async::<()>(&mut conn)
                .await?;
        }
        Ok(conn)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(ServiceError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_rejected() {
        let config = RedisConfig {
            url: "not-a-redis-url".to_string(),
            db: 0,
        };
        let err = Cache::new(&config).err().unwrap();
        assert_eq!(err.code(), "REDIS_ERROR");
    }

    #[tokio::test]
    #[ignore] // 需要 Redis 连接
    async fn test_redis_roundtrip() {
        let cache = Cache::new(&RedisConfig::default()).unwrap();
        cache.health_check().await.unwrap();
        let mut conn = cache.connection().await.unwrap();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await.unwrap();
        assert_eq!(pong, "PONG");
    }
}
