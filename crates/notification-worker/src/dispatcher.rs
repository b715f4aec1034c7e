//! 消息分发器
//!
//! 按消息类型在注册表中查找 Handler 并调用。类型为封闭枚举，新增类型时编译器会要求补全分支。

use std::sync::Arc;

use notify_shared::observability::metrics;
use serde::Deserialize;
use tracing::{error, warn};

use crate::error::NotificationError;
use crate::message::{MessageKind, NotificationMessage};
use crate::registry::Registry;

/// 未注册类型的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnroutablePolicy {
    /// 记录日志后正常返回，传输层视为成功
    #[default]
    Drop,
    /// 返回 `KindDisabled`，传输层视为失败
    Reject,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    policy: UnroutablePolicy,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, policy: UnroutablePolicy) -> Self {
        Self { registry, policy }
    }

    /// 分发一条消息，Handler 的结果原样返回
    pub async fn dispatch(&self, message: NotificationMessage) -> Result<(), NotificationError> {
        match message {
            NotificationMessage::Email(email) => match self.registry.email() {
                Some(handler) => handler.handle(&email).await,
                None => self.unroutable(MessageKind::Email),
            },
            NotificationMessage::Sms(sms) => match self.registry.sms() {
                Some(handler) => handler.handle(&sms).await,
                None => self.unroutable(MessageKind::Sms),
            },
        }
    }

    fn unroutable(&self, kind: MessageKind) -> Result<(), NotificationError> {
        metrics::record_unroutable(kind.as_str());
        match self.policy {
            UnroutablePolicy::Drop => {
                error!(kind = %kind, "没有该类型的 Handler，消息已丢弃");
                Ok(())
            }
            UnroutablePolicy::Reject => {
                warn!(kind = %kind, "没有该类型的 Handler，消息被拒绝");
                Err(NotificationError::KindDisabled { kind })
            }
        }
    }
}
