//! SMTP 邮件 Provider
//!
//! lettre 的同步传输在阻塞线程池中执行，不占用异步运行时线程。

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, info};

use super::Provider;
use crate::config::SmtpConfig;
use crate::error::{NotificationError, ProviderError};
use crate::message::EmailMessage;

const NAME: &str = "smtp";
const FALLBACK_FROM: &str = "no-reply@example.com";

pub struct SmtpProvider {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpProvider {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotificationError> {
        let builder = if config.use_tls {
            SmtpTransport::starttls_relay(&config.host)
                .map_err(|e| NotificationError::provider_config(NAME, e.to_string()))?
        } else {
            SmtpTransport::builder_dangerous(&config.host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)));

        match (non_empty(&config.username), non_empty(&config.password)) {
            (Some(username), Some(password)) => {
                builder = builder
                    .credentials(Credentials::new(username.to_string(), password.to_string()));
            }
            (None, None) => {}
            _ => {
                return Err(NotificationError::provider_config(
                    NAME,
                    "username 与 password 必须同时配置",
                ));
            }
        }

        let from = config
            .from
            .clone()
            .or_else(|| non_empty(&config.username).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_FROM.to_string());
        let from: Mailbox = from
            .parse()
            .map_err(|e| NotificationError::provider_config(NAME, format!("发件人地址无效: {e}")))?;

        debug!(host = %config.host, port = config.port, tls = config.use_tls, "SMTP Provider 已配置");

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl Provider<EmailMessage> for SmtpProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), ProviderError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| ProviderError::Message(format!("收件人地址无效: {e}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| ProviderError::Message(e.to_string()))?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| ProviderError::Task(e.to_string()))??;

        info!(provider = NAME, to = %message.to, "邮件已发送");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_config(port: u16) -> SmtpConfig {
        SmtpConfig {
            host: "127.0.0.1".to_string(),
            port,
            use_tls: false,
            timeout_seconds: 1,
            ..SmtpConfig::default()
        }
    }

    #[test]
    fn test_from_falls_back_to_username() {
        let config = SmtpConfig {
            username: Some("mailer@example.com".to_string()),
            password: Some("secret".to_string()),
            ..plain_config(25)
        };
        let provider = SmtpProvider::from_config(&config).unwrap();
        assert_eq!(provider.from.email.to_string(), "mailer@example.com");
    }

    #[test]
    fn test_invalid_from_is_config_error() {
        let config = SmtpConfig {
            from: Some("not an address".to_string()),
            ..plain_config(25)
        };
        let err = SmtpProvider::from_config(&config).err().unwrap();
        assert_eq!(err.code(), "PROVIDER_CONFIG_ERROR");
    }

    #[test]
    fn test_username_without_password_rejected() {
        let config = SmtpConfig {
            username: Some("mailer@example.com".to_string()),
            password: None,
            ..plain_config(25)
        };
        let err = SmtpProvider::from_config(&config).err().unwrap();
        assert_eq!(err.code(), "PROVIDER_CONFIG_ERROR");
        assert!(err.to_string().contains("smtp"));
    }

    #[test]
    fn test_password_without_username_rejected() {
        let config = SmtpConfig {
            username: Some(String::new()),
            password: Some("secret".to_string()),
            ..plain_config(25)
        };
        let err = SmtpProvider::from_config(&config).err().unwrap();
        assert_eq!(err.code(), "PROVIDER_CONFIG_ERROR");
    }

    #[test]
    fn test_anonymous_relay_allowed() {
        assert!(SmtpProvider::from_config(&plain_config(25)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_relay_fails() {
        // 端口 1 上没有 SMTP 服务，连接被拒绝
        let provider = SmtpProvider::from_config(&plain_config(1)).unwrap();
        let message = EmailMessage {
            to: "user@example.com".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        let err = provider.send(&message).await.unwrap_err();
        assert!(matches!(err, ProviderError::Smtp(_)));
    }
}
