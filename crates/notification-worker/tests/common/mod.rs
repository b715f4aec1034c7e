//! 集成测试公共工具：记录型 Provider 与确认器

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use notification_worker::consumer::rabbit::{Acknowledger, InboundDelivery, Settlement};
use notification_worker::handler::Handler;
use notification_worker::provider::Provider;
use notification_worker::{
    Dispatcher, EmailMessage, MessageKind, ProviderError, Registry, SmsMessage, UnroutablePolicy,
};
use parking_lot::Mutex;
use serde_json::json;

// ============================================================================
// Provider
// ============================================================================

/// 所有 Provider 共享的调用记录
#[derive(Default)]
pub struct CallTracker {
    calls: Mutex<Vec<&'static str>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CallTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 按调用顺序记录的 Provider 名称
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    Delay(Duration),
}

pub struct FakeProvider {
    name: &'static str,
    behavior: Behavior,
    tracker: Arc<CallTracker>,
}

impl FakeProvider {
    pub fn email(
        name: &'static str,
        behavior: Behavior,
        tracker: &Arc<CallTracker>,
    ) -> Arc<dyn Provider<EmailMessage>> {
        Arc::new(Self {
            name,
            behavior,
            tracker: Arc::clone(tracker),
        })
    }

    pub fn sms(
        name: &'static str,
        behavior: Behavior,
        tracker: &Arc<CallTracker>,
    ) -> Arc<dyn Provider<SmsMessage>> {
        Arc::new(Self {
            name,
            behavior,
            tracker: Arc::clone(tracker),
        })
    }
}

#[async_trait]
impl<M: Send + Sync + 'static> Provider<M> for FakeProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, _message: &M) -> Result<(), ProviderError> {
        self.tracker.calls.lock().push(self.name);
        let current = self.tracker.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.tracker.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(ProviderError::Rejected(format!("{} unavailable", self.name))),
            Behavior::Panic => panic!("{} exploded", self.name),
            Behavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        };

        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// 构造分发器，Provider 列表为空的渠道不注册
pub fn dispatcher(
    email: Vec<Arc<dyn Provider<EmailMessage>>>,
    sms: Vec<Arc<dyn Provider<SmsMessage>>>,
    policy: UnroutablePolicy,
) -> Dispatcher {
    let mut builder = Registry::builder();
    if !email.is_empty() {
        builder = builder.email(Handler::new(MessageKind::Email, email).unwrap());
    }
    if !sms.is_empty() {
        builder = builder.sms(Handler::new(MessageKind::Sms, sms).unwrap());
    }
    Dispatcher::new(Arc::new(builder.build().unwrap()), policy)
}

// ============================================================================
// 载荷
// ============================================================================

pub fn email_payload() -> String {
    json!({
        "kind": "email",
        "data": {"to": "user@example.com", "subject": "Welcome", "body": "Hello"}
    })
    .to_string()
}

pub fn sms_payload() -> String {
    json!({"kind": "sms", "data": {"phone": "09121234567", "message": "code 1234"}}).to_string()
}

pub fn unknown_kind_payload() -> String {
    json!({"kind": "fax", "data": {"number": "021"}}).to_string()
}

// ============================================================================
// 确认器
// ============================================================================

/// 共享的确认记录：(delivery_tag, settlement)
pub type SettlementLog = Arc<Mutex<Vec<(u64, Settlement)>>>;

pub struct FakeAcker {
    tag: u64,
    log: SettlementLog,
}

#[async_trait]
impl Acknowledger for FakeAcker {
    async fn accept(&self) -> notify_shared::Result<()> {
        self.log.lock().push((self.tag, Settlement::Acked));
        Ok(())
    }

    async fn discard(&self) -> notify_shared::Result<()> {
        self.log.lock().push((self.tag, Settlement::Discarded));
        Ok(())
    }
}

pub fn delivery(tag: u64, payload: &str, log: &SettlementLog) -> InboundDelivery<FakeAcker> {
    InboundDelivery {
        delivery_tag: tag,
        data: payload.as_bytes().to_vec(),
        acker: FakeAcker {
            tag,
            log: Arc::clone(log),
        },
    }
}
