//! API.IR 身份核验接口客户端资源
//!
//! 启动时构建带 `X-API-Key` 默认请求头的 reqwest 客户端；非 2xx 响应转换为
//! [`AccountError::Upstream`]，保留状态码与响应体。

use std::time::Duration;

use async_trait::async_trait;
use notify_shared::error::{Result, ServiceError};
use notify_shared::lifecycle::{Lifecycle, LifecycleState, StateCell};
use parking_lot::Mutex;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, info};

use crate::config::ApiIrConfig;
use crate::error::AccountError;

const NAME: &str = "api-ir";

pub struct ApiIrResource {
    config: ApiIrConfig,
    state: StateCell,
    client: Mutex<Option<reqwest::Client>>,
}

impl ApiIrResource {
    pub fn new(config: ApiIrConfig) -> Self {
        Self {
            config,
            state: StateCell::new(NAME),
            client: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> std::result::Result<T, AccountError> {
        let request = self.client()?.get(self.url(endpoint)).query(query);
        self.execute(endpoint, request).await
    }

    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> std::result::Result<T, AccountError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client()?.post(self.url(endpoint)).json(body);
        self.execute(endpoint, request).await
    }

    fn client(&self) -> std::result::Result<reqwest::Client, AccountError> {
        self.client
            .lock()
            .clone()
            .ok_or(AccountError::NotReady { resource: NAME })
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<T, AccountError> {
        let response = request.send().await.map_err(|e| {
            error!(resource = NAME, endpoint, error = %e, "API.IR 请求失败");
            AccountError::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(resource = NAME, endpoint, status = status.as_u16(), body = %body, "API.IR 返回错误");
            return Err(AccountError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        let api_key = HeaderValue::from_str(&self.config.api_key)
            .map_err(|e| ServiceError::InvalidConfig(format!("api_ir.api_key 无效: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .build()
            .map_err(|e| ServiceError::transport("http", e))
    }
}

#[async_trait]
impl Lifecycle for ApiIrResource {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<()> {
        self.state.begin_start()?;

        let client = match self.build_client() {
            Ok(client) => client,
            Err(e) => {
                self.state.mark_failed();
                return Err(e);
            }
        };
        *self.client.lock() = Some(client);

        if !self.state.mark_running() {
            self.client.lock().take();
            return Err(ServiceError::Cancelled {
                unit: NAME.to_string(),
            });
        }

        info!(resource = NAME, base_url = %self.config.base_url, "API.IR 客户端已就绪");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.state.begin_close().is_none() {
            self.state.wait_closed().await;
            return Ok(());
        }
        if self.client.lock().take().is_some() {
            info!(resource = NAME, "API.IR 客户端已关闭");
        }
        self.state.mark_closed();
        Ok(())
    }
}
