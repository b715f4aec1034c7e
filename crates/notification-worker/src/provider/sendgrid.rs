//! SendGrid 邮件 Provider

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{Provider, ensure_success, http_client, required};
use crate::config::SendGridConfig;
use crate::error::{NotificationError, ProviderError};
use crate::message::EmailMessage;

const NAME: &str = "sendgrid";

pub struct SendGridProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    from: String,
}

impl SendGridProvider {
    pub fn from_config(config: &SendGridConfig) -> Result<Self, NotificationError> {
        Ok(Self {
            client: http_client(NAME, config.timeout_seconds)?,
            url: format!("{}/v3/mail/send", config.base_url.trim_end_matches('/')),
            api_key: required(NAME, "api_key", &config.api_key)?,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Provider<EmailMessage> for SendGridProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), ProviderError> {
        let body = json!({
            "personalizations": [{"to": [{"email": message.to}]}],
            "from": {"email": self.from},
            "subject": message.subject,
            "content": [{"type": "text/plain", "value": message.body}]
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;

        info!(provider = NAME, to = %message.to, "邮件已发送");
        Ok(())
    }
}
