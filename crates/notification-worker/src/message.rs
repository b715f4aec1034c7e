//! 通知消息模型
//!
//! 两种传输层共用同一个 JSON 载荷格式：
//!
//! ```json
//! {"kind": "email", "data": {"to": "a@example.com", "subject": "hi", "body": "..."}}
//! {"kind": "sms",   "data": {"phone": "+989120000000", "message": "..."}}
//! ```
//!
//! 每一层都拒绝未知字段，未知的 `kind` 在解码阶段即被拒绝，不会到达 Dispatcher。

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::NotificationError;

/// 消息类型判别值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Email,
    Sms,
}

impl MessageKind {
    pub const ALL: [MessageKind; 2] = [MessageKind::Email, MessageKind::Sms];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 邮件载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EmailMessage {
    #[validate(email)]
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// 短信载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SmsMessage {
    #[validate(length(min = 1))]
    pub phone: String,
    pub message: String,
}

/// 归一化后的通知消息
///
/// 判别值与载荷类型由枚举变体绑定，不存在不一致的组合。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    content = "data",
    rename_all = "lowercase",
    deny_unknown_fields
)]
pub enum NotificationMessage {
    Email(EmailMessage),
    Sms(SmsMessage),
}

impl NotificationMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Email(_) => MessageKind::Email,
            Self::Sms(_) => MessageKind::Sms,
        }
    }

    /// 从传输层字节解码并校验载荷
    pub fn decode(payload: &[u8]) -> Result<Self, NotificationError> {
        let message: Self = serde_json::from_slice(payload)
            .map_err(|e| NotificationError::Decode(e.to_string()))?;

        let validation = match &message {
            Self::Email(email) => email.validate(),
            Self::Sms(sms) => sms.validate(),
        };
        validation.map_err(|e| NotificationError::Decode(e.to_string()))?;

        Ok(message)
    }
}
