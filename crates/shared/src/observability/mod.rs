//! 统一可观测性模块
//!
//! 提供 logging 与 metrics 的统一初始化。所有服务通过单一入口点配置，
//! 确保一致的日志格式与指标命名。

pub mod metrics;
pub mod tracing;

use std::sync::Arc;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

use crate::http::HttpServer;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识日志和指标的来源
    pub service_name: String,

    /// 日志级别（如 "info", "debug"），RUST_LOG 优先
    pub log_level: String,

    /// 是否启用 JSON 格式日志
    pub json_logs: bool,

    /// 是否启用 Prometheus 指标导出
    pub metrics_enabled: bool,

    /// Prometheus 指标导出端口
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

impl ObservabilityConfig {
    /// 注入服务名（配置文件中通常不重复填写）
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }
}

/// 可观测性资源守卫
///
/// 持有指标 HTTP 服务组件；该组件需要注册到 Orchestrator 中统一启动和关闭。
pub struct ObservabilityGuard {
    metrics_server: Option<Arc<HttpServer>>,
}

impl ObservabilityGuard {
    /// 指标服务组件（未启用指标时为 None）
    pub fn metrics_server(&self) -> Option<Arc<HttpServer>> {
        self.metrics_server.clone()
    }
}

/// 统一初始化可观测性
///
/// 初始化顺序：
/// 1. Tracing（日志）
/// 2. Metrics（安装 Prometheus recorder，构造指标服务组件）
pub fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    info!(
        service = %config.service_name,
        metrics_enabled = config.metrics_enabled,
        metrics_port = config.metrics_port,
        "Observability initialized"
    );

    let metrics_server = if config.metrics_enabled {
        Some(Arc::new(metrics::init(config)?))
    } else {
        None
    };

    Ok(ObservabilityGuard { metrics_server })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_with_service_name() {
        let config = ObservabilityConfig::default().with_service_name("notification-worker");
        assert_eq!(config.service_name, "notification-worker");
    }
}
