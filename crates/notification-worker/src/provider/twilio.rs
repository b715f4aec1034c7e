//! Twilio 短信 Provider

use async_trait::async_trait;
use tracing::info;

use super::{Provider, ensure_success, http_client, required};
use crate::config::TwilioConfig;
use crate::error::{NotificationError, ProviderError};
use crate::message::SmsMessage;

const NAME: &str = "twilio";

pub struct TwilioProvider {
    client: reqwest::Client,
    url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioProvider {
    pub fn from_config(config: &TwilioConfig) -> Result<Self, NotificationError> {
        let account_sid = required(NAME, "account_sid", &config.account_sid)?;
        Ok(Self {
            client: http_client(NAME, config.timeout_seconds)?,
            url: format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                config.base_url.trim_end_matches('/'),
                account_sid
            ),
            account_sid,
            auth_token: required(NAME, "auth_token", &config.auth_token)?,
            from_number: required(NAME, "from_number", &config.from_number)?,
        })
    }
}

#[async_trait]
impl Provider<SmsMessage> for TwilioProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn send(&self, message: &SmsMessage) -> Result<(), ProviderError> {
        let form = [
            ("To", message.phone.as_str()),
            ("From", self.from_number.as_str()),
            ("Body", message.message.as_str()),
        ];

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;
        ensure_success(response).await?;

        info!(provider = NAME, phone = %message.phone, "短信已发送");
        Ok(())
    }
}
