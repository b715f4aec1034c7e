//! 传输层消费者
//!
//! 每个消费者持有一个传输层监听（gRPC 服务端或 AMQP 订阅），负责把载荷解码为
//! [`NotificationMessage`] 并交给 [`Dispatcher`]，再以传输层约定的方式回报结果。
//!
//! 消费者共享同一套状态机（见 [`notify_shared::lifecycle::StateCell`]），
//! 由 Orchestrator 统一启动和关闭。

pub mod grpc;
pub mod rabbit;

pub use grpc::{GrpcConsumer, GrpcConsumerSettings};
pub use rabbit::{RabbitConsumer, RabbitConsumerSettings};

use notify_shared::lifecycle::{Lifecycle, LifecycleState};
use notify_shared::observability::metrics;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::error::NotificationError;
use crate::message::NotificationMessage;

/// 传输层消费者
pub trait Consumer: Lifecycle {
    /// 传输层标识（用于日志与指标标签）
    fn transport(&self) -> &'static str;

    fn state(&self) -> LifecycleState;
}

/// 解码并分发一条载荷
///
/// 解码失败时不会调用 Dispatcher。
pub async fn process_payload(
    dispatcher: &Dispatcher,
    transport: &'static str,
    payload: &[u8],
) -> Result<(), NotificationError> {
    let span = info_span!("notification", transport, message_id = %Uuid::now_v7());

    async move {
        let message = match NotificationMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                metrics::record_inbound_message(transport, "decode_error");
                warn!(error = %e, payload_len = payload.len(), "载荷解码失败");
                return Err(e);
            }
        };

        let kind = message.kind();
        debug!(kind = %kind, "收到通知消息");

        match dispatcher.dispatch(message).await {
            Ok(()) => {
                metrics::record_inbound_message(transport, "success");
                Ok(())
            }
            Err(e) => {
                metrics::record_inbound_message(transport, "dispatch_failed");
                warn!(kind = %kind, error = %e, code = e.code(), "通知分发失败");
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}
