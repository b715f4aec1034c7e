//! JWT 签名资源
//!
//! HS256 签发访问令牌与刷新令牌，并负责解码校验。签名器不持有外部连接，
//! 启动与关闭只推进状态机。

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use notify_shared::error::{Result, ServiceError};
use notify_shared::lifecycle::{Lifecycle, LifecycleState, StateCell};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::AccountError;

const NAME: &str = "jwt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// JWT Claims（Token 载荷）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户标识
    pub sub: String,
    pub typ: TokenType,
    /// Token 唯一标识
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// 一次登录签发的令牌对
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// 访问令牌有效期（秒）
    pub expires_in: i64,
}

pub struct JwtResource {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    state: StateCell,
}

impl JwtResource {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
            state: StateCell::new(NAME),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn create_access_token(&self, subject: &str) -> std::result::Result<String, AccountError> {
        self.sign(
            subject,
            TokenType::Access,
            Duration::minutes(self.config.access_expires_minutes),
        )
    }

    pub fn create_refresh_token(&self, subject: &str) -> std::result::Result<String, AccountError> {
        self.sign(
            subject,
            TokenType::Refresh,
            Duration::days(self.config.refresh_expires_days),
        )
    }

    /// 同时签发访问令牌与刷新令牌
    pub fn issue_pair(&self, subject: &str) -> std::result::Result<TokenPair, AccountError> {
        Ok(TokenPair {
            access_token: self.create_access_token(subject)?,
            refresh_token: self.create_refresh_token(subject)?,
            expires_in: self.config.access_expires_minutes * 60,
        })
    }

    /// 解码并校验签名、过期时间与签发者
    pub fn decode_token(&self, token: &str) -> std::result::Result<Claims, AccountError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AccountError::TokenExpired,
                _ => AccountError::InvalidToken(e.to_string()),
            })
    }

    /// 解码并要求指定的令牌类型
    pub fn verify(
        &self,
        token: &str,
        expected: TokenType,
    ) -> std::result::Result<Claims, AccountError> {
        let claims = self.decode_token(token)?;
        if claims.typ != expected {
            return Err(AccountError::WrongTokenType {
                expected: expected.as_str(),
            });
        }
        Ok(claims)
    }

    /// 用刷新令牌换取新的令牌对
    pub fn refresh(&self, refresh_token: &str) -> std::result::Result<TokenPair, AccountError> {
        let claims = self.verify(refresh_token, TokenType::Refresh)?;
        self.issue_pair(&claims.sub)
    }

    fn sign(
        &self,
        subject: &str,
        typ: TokenType,
        ttl: Duration,
    ) -> std::result::Result<String, AccountError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            typ,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.config.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AccountError::Internal(format!("JWT 生成失败: {e}")))
    }
}

#[async_trait]
impl Lifecycle for JwtResource {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<()> {
        self.state.begin_start()?;
        if !self.state.mark_running() {
            return Err(ServiceError::Cancelled {
                unit: NAME.to_string(),
            });
        }
        info!(resource = NAME, issuer = %self.config.issuer, "JWT 资源已就绪");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.state.begin_close().is_none() {
            self.state.wait_closed().await;
            return Ok(());
        }
        self.state.mark_closed();
        info!(resource = NAME, "JWT 资源已关闭");
        Ok(())
    }
}
