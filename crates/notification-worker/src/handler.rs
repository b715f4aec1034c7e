//! 回退投递 Handler
//!
//! 每种消息类型对应一个 Handler，持有按配置顺序排列的 Provider 列表（首个为主 Provider）。
//! 投递时严格按顺序尝试，第一个成功即返回；全部失败时返回一个聚合错误，
//! 以最后一个 Provider 的错误作为根因，之前的失败只记录日志。

use std::sync::Arc;
use std::time::Instant;

use notify_shared::observability::metrics;
use tracing::{info, warn};

use crate::error::NotificationError;
use crate::message::MessageKind;
use crate::provider::Provider;

pub struct Handler<M> {
    kind: MessageKind,
    providers: Vec<Arc<dyn Provider<M>>>,
}

impl<M: Send + Sync + 'static> Handler<M> {
    /// 构造 Handler，Provider 列表为空时返回配置错误
    pub fn new(
        kind: MessageKind,
        providers: Vec<Arc<dyn Provider<M>>>,
    ) -> Result<Self, NotificationError> {
        if providers.is_empty() {
            return Err(NotificationError::NoProviders { kind });
        }
        Ok(Self { kind, providers })
    }

    /// Provider 名称（按回退顺序）
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn handle(&self, message: &M) -> Result<(), NotificationError> {
        let kind = self.kind.as_str();
        let mut last_error = None;

        for (attempt, provider) in self.providers.iter().enumerate() {
            let started = Instant::now();
            let result = provider.send(message).await;
            let elapsed = started.elapsed().as_secs_f64();

            match result {
                Ok(()) => {
                    metrics::record_delivery_attempt(kind, provider.name(), "success", elapsed);
                    info!(kind, provider = provider.name(), attempt = attempt + 1, "投递成功");
                    return Ok(());
                }
                Err(e) => {
                    metrics::record_delivery_attempt(kind, provider.name(), "failed", elapsed);
                    warn!(
                        kind,
                        provider = provider.name(),
                        attempt = attempt + 1,
                        error = %e,
                        "Provider 投递失败，尝试下一个"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(source) => Err(NotificationError::AllProvidersFailed {
                kind: self.kind,
                attempts: self.providers.len(),
                source,
            }),
            None => Err(NotificationError::NoProviders { kind: self.kind }),
        }
    }
}
