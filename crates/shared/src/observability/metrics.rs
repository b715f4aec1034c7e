//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::PrometheusBuilder;

use super::ObservabilityConfig;
use crate::http::HttpServer;

/// 安装 Prometheus recorder 并构造指标服务组件
///
/// 返回的 [`HttpServer`] 暴露 `/metrics` 与 `/health`，由调用方注册到 Orchestrator。
pub fn init(config: &ObservabilityConfig) -> Result<HttpServer> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let router = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    Ok(HttpServer::new(
        "metrics-server",
        format!("0.0.0.0:{}", config.metrics_port),
        router,
    ))
}

/// 注册通用指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "notification_messages_total",
        "Inbound notification messages by transport and outcome"
    );
    metrics::describe_counter!(
        "notification_delivery_attempts_total",
        "Provider delivery attempts by kind, provider and status"
    );
    metrics::describe_histogram!(
        "notification_delivery_duration_seconds",
        "Provider delivery attempt duration in seconds"
    );
    metrics::describe_counter!(
        "notification_unroutable_total",
        "Messages whose kind has no configured handler"
    );
    metrics::describe_gauge!(
        "transport_connected",
        "1 while the transport holds a live broker session, 0 while reconnecting"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一条入站消息的处理结果
#[inline]
pub fn record_inbound_message(transport: &str, outcome: &str) {
    metrics::counter!(
        "notification_messages_total",
        "transport" => transport.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录一次 Provider 投递尝试
#[inline]
pub fn record_delivery_attempt(kind: &str, provider: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        "notification_delivery_attempts_total",
        "kind" => kind.to_string(),
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "notification_delivery_duration_seconds",
        "kind" => kind.to_string(),
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}

/// 记录无法路由的消息
#[inline]
pub fn record_unroutable(kind: &str) {
    metrics::counter!("notification_unroutable_total", "kind" => kind.to_string()).increment(1);
}

/// 记录传输层与 broker 的连接状态
#[inline]
pub fn record_transport_connected(transport: &str, connected: bool) {
    metrics::gauge!("transport_connected", "transport" => transport.to_string())
        .set(if connected { 1.0 } else { 0.0 });
}
