//! 账户服务配置
//!
//! 与通知服务共用分层加载规则（`config/default.toml → config/{env}.toml →
//! config/account-service.toml → NOTIFY__*`）。

use serde::Deserialize;

use notify_shared::config::{self as shared_config, DatabaseConfig, RedisConfig, ServerConfig};
use notify_shared::error::ServiceError;
use notify_shared::observability::ObservabilityConfig;

pub const SERVICE_NAME: &str = "account-service";

/// 账户服务根配置
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub api_ir: ApiIrConfig,
}

impl AccountConfig {
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
        if self.jwt.secret.trim().is_empty() {
            return Err(ServiceError::InvalidConfig("jwt.secret 不能为空".to_string()));
        }
        if self.api_ir.api_key.trim().is_empty() {
            return Err(ServiceError::InvalidConfig(
                "api_ir.api_key 不能为空".to_string(),
            ));
        }
        if self.jwt.access_expires_minutes <= 0 || self.jwt.refresh_expires_days <= 0 {
            return Err(ServiceError::InvalidConfig(
                "jwt 过期时间必须为正数".to_string(),
            ));
        }
        Ok(())
    }
}

/// JWT 配置（HS256）
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_access_expires_minutes")]
    pub access_expires_minutes: i64,
    #[serde(default = "default_refresh_expires_days")]
    pub refresh_expires_days: i64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

fn default_access_expires_minutes() -> i64 {
    15
}

fn default_refresh_expires_days() -> i64 {
    30
}

fn default_issuer() -> String {
    SERVICE_NAME.to_string()
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"***")
            .field("access_expires_minutes", &self.access_expires_minutes)
            .field("refresh_expires_days", &self.refresh_expires_days)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// API.IR 身份核验接口配置
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiIrConfig {
    #[serde(default = "default_api_ir_base_url")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_api_ir_base_url() -> String {
    "https://s.api.ir".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl std::fmt::Debug for ApiIrConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiIrConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}
