//! Ghasedak 短信 Provider

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{Provider, ensure_success, http_client, required};
use crate::config::GhasedakConfig;
use crate::error::{NotificationError, ProviderError};
use crate::message::SmsMessage;

const NAME: &str = "ghasedak";

pub struct GhasedakProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    line_number: String,
}

impl GhasedakProvider {
    pub fn from_config(config: &GhasedakConfig) -> Result<Self, NotificationError> {
        Ok(Self {
            client: http_client(NAME, config.timeout_seconds)?,
            url: format!(
                "{}/v2/sms/send/simple",
                config.base_url.trim_end_matches('/')
            ),
            api_key: required(NAME, "api_key", &config.api_key)?,
            line_number: required(NAME, "line_number", &config.line_number)?,
        })
    }
}

#[async_trait]
impl Provider<SmsMessage> for GhasedakProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn send(&self, message: &SmsMessage) -> Result<(), ProviderError> {
        let form = [
            ("message", message.message.as_str()),
            ("receptor", message.phone.as_str()),
            ("linenumber", self.line_number.as_str()),
        ];

        let response = self
            .client
            .post(&self.url)
            .header("apikey", &self.api_key)
            .form(&form)
            .send()
            .await?;
        let body: Value = ensure_success(response).await?.json().await?;

        // 业务结果码位于 result.code
        match body.pointer("/result/code").and_then(Value::as_i64) {
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
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GhasedakProvider {
        GhasedakProvider::from_config(&GhasedakConfig {
            api_key: Some("gk".to_string()),
            line_number: Some("30005088".to_string()),
            base_url: server.uri(),
            ..GhasedakConfig::default()
        })
        .unwrap()
    }

    fn sms() -> SmsMessage {
        SmsMessage {
            phone: "09120000000".to_string(),
            message: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/sms/send/simple"))
            .and(header("apikey", "gk"))
            .and(body_string_contains("linenumber=30005088"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": {"code": 200, "message": "success"}, "items": [1]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        provider(&server).send(&sms()).await.unwrap();
    }

    #[tokio::test]
    async fn test_result_code_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": {"code": 401, "message": "unauthorized"}})),
            )
            .mount(&server)
            .await;

        let err = provider(&server).send(&sms()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));
    }
}
