//! 通知服务错误类型
//!
//! 区分单次 Provider 投递失败（[`ProviderError`]）与管道级错误（[`NotificationError`]），
//! 便于消费者根据错误类型决定回复 false、拒收消息或拒绝启动。

use notify_shared::error::ServiceError;
use thiserror::Error;

use crate::message::MessageKind;

/// 单个 Provider 的一次投递失败
///
/// 瞬时错误（网络超时）与永久错误（凭证无效）不做区分，统一交由 Handler 回退到下一个 Provider。
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP 状态异常: status={status}, body={body}")]
    Status { status: u16, body: String },

    #[error("服务商拒绝请求: {0}")]
    Rejected(String),

    #[error("SMTP 发送失败: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("邮件构建失败: {0}")]
    Message(String),

    #[error("发送任务异常退出: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("消息解码失败: {0}")]
    Decode(String),

    #[error("渠道 {kind} 没有可用的 Provider")]
    NoProviders { kind: MessageKind },

    #[error("没有任何启用的投递渠道")]
    EmptyRegistry,

    #[error("Provider 配置无效: {provider} - {reason}")]
    ProviderConfig { provider: String, reason: String },

    #[error("渠道 {kind} 未启用，消息被拒绝")]
    KindDisabled { kind: MessageKind },

    #[error("渠道 {kind} 的全部 {attempts} 个 Provider 投递失败")]
    AllProvidersFailed {
        kind: MessageKind,
        attempts: usize,
        #[source]
        source: ProviderError,
    },

    #[error("消费者配置无效: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Shared(#[from] ServiceError),
}

impl NotificationError {
    pub fn provider_config(provider: &str, reason: impl Into<String>) -> Self {
        Self::ProviderConfig {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE_ERROR",
            Self::NoProviders { .. } => "NO_PROVIDERS",
            Self::EmptyRegistry => "EMPTY_REGISTRY",
            Self::ProviderConfig { .. } => "PROVIDER_CONFIG_ERROR",
            Self::KindDisabled { .. } => "KIND_DISABLED",
            Self::AllProvidersFailed { .. } => "ALL_PROVIDERS_FAILED",
            Self::InvalidSettings(_) => "INVALID_SETTINGS",
            Self::Shared(e) => e.code(),
        }
    }
}
