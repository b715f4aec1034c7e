//! 投递 Provider
//!
//! 每个 Provider 对应一个具体的投递后端（SMTP 中继、短信网关等），只负责单次发送：
//! 不做内部重试，失败直接返回，由 Handler 回退到下一个 Provider。
//!
//! ## 支持的 Provider
//!
//! - **Email**: `smtp`、`sendgrid`
//! - **SMS**: `kavenegar`、`ghasedak`、`twilio`

mod ghasedak;
mod kavenegar;
mod sendgrid;
mod smtp;
mod twilio;

pub use ghasedak::GhasedakProvider;
pub use kavenegar::KavenegarProvider;
pub use sendgrid::SendGridProvider;
pub use smtp::SmtpProvider;
pub use twilio::TwilioProvider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{EmailProviderConfig, SmsProviderConfig};
use crate::error::{NotificationError, ProviderError};
use crate::message::{EmailMessage, SmsMessage};

/// 投递后端接口
///
/// 返回 Ok 表示后端已接受该通知。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider<M: Send + Sync + 'static>: Send + Sync {
    /// Provider 名称（用于日志与指标标签）
    fn name(&self) -> &'static str;

    async fn send(&self, message: &M) -> Result<(), ProviderError>;
}

pub type EmailProvider = Arc<dyn Provider<EmailMessage>>;
pub type SmsProvider = Arc<dyn Provider<SmsMessage>>;

/// 按配置顺序构造已启用的邮件 Provider
pub fn build_email_providers(
    configs: &[EmailProviderConfig],
) -> Result<Vec<EmailProvider>, NotificationError> {
    let mut providers: Vec<EmailProvider> = Vec::with_capacity(configs.len());
    for (position, config) in configs.iter().enumerate() {
        if !config.enabled() {
            debug!(position, "跳过未启用的邮件 Provider");
            continue;
        }
        let provider: EmailProvider = match config {
            EmailProviderConfig::Smtp(c) => Arc::new(SmtpProvider::from_config(c)?),
            EmailProviderConfig::Sendgrid(c) => Arc::new(SendGridProvider::from_config(c)?),
        };
        info!(provider = provider.name(), "注册邮件 Provider");
        providers.push(provider);
    }
    Ok(providers)
}

/// 按配置顺序构造已启用的短信 Provider
pub fn build_sms_providers(
    configs: &[SmsProviderConfig],
) -> Result<Vec<SmsProvider>, NotificationError> {
    let mut providers: Vec<SmsProvider> = Vec::with_capacity(configs.len());
    for (position, config) in configs.iter().enumerate() {
        if !config.enabled() {
            debug!(position, "跳过未启用的短信 Provider");
            continue;
        }
        let provider: SmsProvider = match config {
            SmsProviderConfig::Kavenegar(c) => Arc::new(KavenegarProvider::from_config(c)?),
            SmsProviderConfig::Ghasedak(c) => Arc::new(GhasedakProvider::from_config(c)?),
            SmsProviderConfig::Twilio(c) => Arc::new(TwilioProvider::from_config(c)?),
        };
        info!(provider = provider.name(), "注册短信 Provider");
        providers.push(provider);
    }
    Ok(providers)
}

// ---------------------------------------------------------------------------
// 公共辅助
// ---------------------------------------------------------------------------

/// 取出必填凭证，缺失或为空视为配置错误
fn required(
    provider: &str,
    field: &str,
    value: &Option<String>,
) -> Result<String, NotificationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(NotificationError::provider_config(
            provider,
            format!("缺少 {field}"),
        )),
    }
}

/// 构造带超时的 HTTP 客户端
fn http_client(provider: &str, timeout_seconds: u64) -> Result<reqwest::Client, NotificationError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| NotificationError::provider_config(provider, e.to_string()))
}

/// 非 2xx 响应转换为 [`ProviderError::Status`]
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}
