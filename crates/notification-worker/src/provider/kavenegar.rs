//! Kavenegar 短信 Provider
//!
//! 成功条件：HTTP 200 且响应体 `return.status == 200`。

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{Provider, http_client, required};
use crate::config::KavenegarConfig;
use crate::error::{NotificationError, ProviderError};
use crate::message::SmsMessage;

const NAME: &str = "kavenegar";

pub struct KavenegarProvider {
    client: reqwest::Client,
    url: String,
    sender: String,
}

impl KavenegarProvider {
    pub fn from_config(config: &KavenegarConfig) -> Result<Self, NotificationError> {
        let api_key = required(NAME, "api_key", &config.api_key)?;
        let sender = required(NAME, "sender", &config.sender)?;

        Ok(Self {
            client: http_client(NAME, config.timeout_seconds)?,
            url: format!(
                "{}/v1/{}/sms/send.json",
                config.base_url.trim_end_matches('/'),
                api_key
            ),
            sender,
        })
    }
}

#[async_trait]
impl Provider<SmsMessage> for KavenegarProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn send(&self, message: &SmsMessage) -> Result<(), ProviderError> {
        let form = [
            ("receptor", message.phone.as_str()),
            ("sender", self.sender.as_str()),
            ("message", message.message.as_str()),
        ];

        let response = self.client.post(&self.url).form(&form).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        match body.pointer("/return/status").and_then(Value::as_i64) {
            Some(200) => {
                info!(provider = NAME, phone = %message.phone, "短信已发送");
                Ok(())
            }
            _ => Err(ProviderError::Rejected(body.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> KavenegarProvider {
        KavenegarProvider::from_config(&KavenegarConfig {
            api_key: Some("test-key".to_string()),
            sender: Some("10004346".to_string()),
            base_url: server.uri(),
            timeout_seconds: 5,
            ..KavenegarConfig::default()
        })
        .unwrap()
    }

    fn sms() -> SmsMessage {
        SmsMessage {
            phone: "09121234567".to_string(),
            message: "code 1234".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/test-key/sms/send.json"))
            .and(body_string_contains("receptor=09121234567"))
            .and(body_string_contains("sender=10004346"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"return": {"status": 200, "message": "تایید شد"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        provider(&server).send(&sms()).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_level_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"return": {"status": 411, "message": "invalid receptor"}})),
            )
            .mount(&server)
            .await;

        let err = provider(&server).send(&sms()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = provider(&server).send(&sms()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 503, .. }));
    }

    #[test]
    fn test_missing_sender_is_config_error() {
        let err = KavenegarProvider::from_config(&KavenegarConfig {
            api_key: Some("k".to_string()),
            ..KavenegarConfig::default()
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("sender"));
    }
}
