//! Handler 注册表
//!
//! 启动时根据配置一次性构建，之后只读，并发分发无需加锁。
//! 每种消息类型对应一个可选的 Handler：渠道未启用或没有启用的 Provider 时该类型缺省。
//!
//! ```ignore
//! let registry = Registry::builder()
//!     .sms(Handler::new(MessageKind::Sms, sms_providers)?)
//!     .build()?;
//! ```

use tracing::info;

use crate::config::ChannelsConfig;
use crate::error::NotificationError;
use crate::handler::Handler;
use crate::message::{EmailMessage, MessageKind, SmsMessage};
use crate::provider;

pub struct Registry {
    email: Option<Handler<EmailMessage>>,
    sms: Option<Handler<SmsMessage>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// 根据渠道配置构建注册表
    ///
    /// 启用但缺少凭证的 Provider 视为配置错误；没有任何可用渠道时返回 `EmptyRegistry`。
    pub fn from_config(config: &ChannelsConfig) -> Result<Self, NotificationError> {
        let mut builder = Self::builder();

        if config.email.enabled {
            let providers = provider::build_email_providers(&config.email.providers)?;
            if !providers.is_empty() {
                builder = builder.email(Handler::new(MessageKind::Email, providers)?);
            }
        }

        if config.sms.enabled {
            let providers = provider::build_sms_providers(&config.sms.providers)?;
            if !providers.is_empty() {
                builder = builder.sms(Handler::new(MessageKind::Sms, providers)?);
            }
        }

        builder.build()
    }

    pub fn email(&self) -> Option<&Handler<EmailMessage>> {
        self.email.as_ref()
    }

    pub fn sms(&self) -> Option<&Handler<SmsMessage>> {
        self.sms.as_ref()
    }

    pub fn contains(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::Email => self.email.is_some(),
            MessageKind::Sms => self.sms.is_some(),
        }
    }

    /// 已注册的消息类型
    pub fn kinds(&self) -> Vec<MessageKind> {
        MessageKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    email: Option<Handler<EmailMessage>>,
    sms: Option<Handler<SmsMessage>>,
}

impl RegistryBuilder {
    pub fn email(mut self, handler: Handler<EmailMessage>) -> Self {
        self.email = Some(handler);
        self
    }

    pub fn sms(mut self, handler: Handler<SmsMessage>) -> Self {
        self.sms = Some(handler);
        self
    }

    pub fn build(self) -> Result<Registry, NotificationError> {
        let registry = Registry {
            email: self.email,
            sms: self.sms,
        };

        if registry.kinds().is_empty() {
            return Err(NotificationError::EmptyRegistry);
        }

        for kind in registry.kinds() {
            let providers = match kind {
                MessageKind::Email => registry.email().map(Handler::provider_names),
                MessageKind::Sms => registry.sms().map(Handler::provider_names),
            };
            info!(kind = %kind, providers = ?providers.unwrap_or_default(), "注册投递渠道");
        }

        Ok(registry)
    }
}
