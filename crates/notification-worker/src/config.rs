//! 通知服务配置
//!
//! 配置按 `config/default.toml → config/{env}.toml → config/notification-worker.toml →
//! NOTIFY__*` 的顺序分层加载。传输层与 Provider 段落拒绝未知字段，拼写错误在启动时暴露。
//!
//! Provider 以有序数组配置，数组顺序即回退顺序：
//!
//! ```toml
//! [[channels.sms.providers]]
//! type = "kavenegar"
//! api_key = "..."
//! sender = "10004346"
//!
//! [[channels.sms.providers]]
//! type = "twilio"
//! enabled = false
//! ```

use serde::Deserialize;

use notify_shared::config as shared_config;
use notify_shared::error::ServiceError;
use notify_shared::observability::ObservabilityConfig;

use crate::dispatcher::UnroutablePolicy;

pub const SERVICE_NAME: &str = "notification-worker";

/// 通知服务根配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub consumers: ConsumersConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl WorkerConfig {
    /// 分层加载配置
    pub fn load() -> Result<Self, ServiceError> {
        let config: Self = shared_config::load(SERVICE_NAME)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文本加载（测试使用）
    pub fn from_toml(toml: &str) -> Result<Self, ServiceError> {
        let config: Self = shared_config::from_toml_str(SERVICE_NAME, toml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if !self.consumers.grpc.enabled && !self.consumers.rabbitmq.enabled {
            return Err(ServiceError::InvalidConfig(
                "至少需要启用一个传输层（consumers.grpc 或 consumers.rabbitmq）".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== 传输层 ====================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsumersConfig {
    pub grpc: GrpcConfig,
    pub rabbitmq: RabbitConfig,
}

/// gRPC 消费者配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrpcConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 50052,
        }
    }
}

/// RabbitMQ 消费者配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RabbitConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub queue_name: String,
    /// 未确认消息的最大数量
    pub prefetch: u16,
    pub consumer_tag: String,
    /// 声明队列时附加的 `x-dead-letter-exchange` 参数
    pub dead_letter_exchange: Option<String>,
}

impl Default for RabbitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "rabbit".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            queue_name: "notifications".to_string(),
            prefetch: 10,
            consumer_tag: "notification-worker".to_string(),
            dead_letter_exchange: None,
        }
    }
}

// ==================== 投递渠道 ====================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelsConfig {
    pub email: ChannelConfig<EmailProviderConfig>,
    pub sms: ChannelConfig<SmsProviderConfig>,
}

/// 单个渠道配置：渠道开关 + 有序 Provider 列表
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig<P> {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "Vec::new")]
    pub providers: Vec<P>,
}

impl<P> Default for ChannelConfig<P> {
    fn default() -> Self {
        Self {
            enabled: true,
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmailProviderConfig {
    Smtp(SmtpConfig),
    Sendgrid(SendGridConfig),
}

impl EmailProviderConfig {
    pub fn enabled(&self) -> bool {
        match self {
            Self::Smtp(c) => c.enabled,
            Self::Sendgrid(c) => c.enabled,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SmsProviderConfig {
    Kavenegar(KavenegarConfig),
    Ghasedak(GhasedakConfig),
    Twilio(TwilioConfig),
}

impl SmsProviderConfig {
    pub fn enabled(&self) -> bool {
        match self {
            Self::Kavenegar(c) => c.enabled,
            Self::Ghasedak(c) => c.enabled,
            Self::Twilio(c) => c.enabled,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 是否使用 STARTTLS
    pub use_tls: bool,
    pub timeout_seconds: u64,
    /// 发件人地址，缺省时使用 username，再缺省为 no-reply@example.com
    pub from: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 587,
            username: None,
            password: None,
            use_tls: true,
            timeout_seconds: 10,
            from: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SendGridConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub from: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for SendGridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            from: "no-reply@example.com".to_string(),
            base_url: "https://api.sendgrid.com".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KavenegarConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub sender: Option<String>,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for KavenegarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            sender: None,
            base_url: "https://api.kavenegar.com".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GhasedakConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub line_number: Option<String>,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for GhasedakConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            line_number: None,
            base_url: "https://api.ghasedak.me".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TwilioConfig {
    pub enabled: bool,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            account_sid: None,
            auth_token: None,
            from_number: None,
            base_url: "https://api.twilio.com".to_string(),
            timeout_seconds: 10,
        }
    }
}

// ==================== 分发策略 ====================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    pub unroutable: UnroutablePolicy,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [consumers.grpc]
        port = 6000

        [consumers.rabbitmq]
        enabled = true
        host = "localhost"
        prefetch = 4
        dead_letter_exchange = "notifications.dlx"

        [channels.email]
        enabled = false

        [[channels.sms.providers]]
        type = "kavenegar"
        api_key = "k"
        sender = "1000"

        [[channels.sms.providers]]
        type = "twilio"
        enabled = false

        [dispatch]
        unroutable = "reject"
    "#;

    #[test]
    fn test_load_sample() {
        let config = WorkerConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.service_name, SERVICE_NAME);
        assert_eq!(config.consumers.grpc.port, 6000);
        assert!(config.consumers.grpc.enabled);
        assert_eq!(config.consumers.rabbitmq.prefetch, 4);
        assert_eq!(
            config.consumers.rabbitmq.dead_letter_exchange.as_deref(),
            Some("notifications.dlx")
        );
        assert_eq!(config.consumers.rabbitmq.queue_name, "notifications");

        assert!(!config.channels.email.enabled);
        let sms = &config.channels.sms.providers;
        assert_eq!(sms.len(), 2);
        assert!(matches!(&sms[0], SmsProviderConfig::Kavenegar(c) if c.api_key.as_deref() == Some("k")));
        assert!(!sms[1].enabled());
        assert_eq!(config.dispatch.unroutable, UnroutablePolicy::Reject);
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_toml("").unwrap();
        assert!(config.consumers.grpc.enabled);
        assert!(!config.consumers.rabbitmq.enabled);
        assert_eq!(config.consumers.rabbitmq.prefetch, 10);
        assert!(config.channels.email.enabled);
        assert!(config.channels.email.providers.is_empty());
        assert_eq!(config.dispatch.unroutable, UnroutablePolicy::Drop);
    }

    #[test]
    fn test_no_transport_enabled_rejected() {
        let err = WorkerConfig::from_toml(
            r#"
            [consumers.grpc]
            enabled = false
            "#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_unknown_transport_key_rejected() {
        let err = WorkerConfig::from_toml(
            r#"
            [consumers.grpc]
            prot = 6000
            "#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "CONFIG_LOAD_ERROR");
    }

    #[test]
    fn test_unknown_provider_type_rejected() {
        let err = WorkerConfig::from_toml(
            r#"
            [[channels.email.providers]]
            type = "mailgun"
            "#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "CONFIG_LOAD_ERROR");
    }
}
