//! RabbitMQ 消费者
//!
//! 订阅一个持久化队列，通过 `basic_qos(prefetch)` 限制未确认消息数量。
//! 每条消息在一个确认作用域内处理：解码 → 分发 → 成功则 ack，任何失败（包括 panic）
//! 都以 `nack(requeue = false)` 拒收，交由队列的死信配置处理。每条消息恰好确认一次。
//!
//! broker 断开导致消息流结束时，消费任务按指数退避重新建立会话，直到重连成功或收到关闭信号。

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, Stream, StreamExt};
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::uri::{AMQPAuthority, AMQPScheme, AMQPUri, AMQPUserInfo};
use lapin::{Channel, Connection, ConnectionProperties};
use notify_shared::error::{Result, ServiceError};
use notify_shared::lifecycle::{Lifecycle, LifecycleState, StateCell};
use notify_shared::observability::metrics;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Consumer, process_payload};
use crate::config::RabbitConfig;
use crate::dispatcher::Dispatcher;
use crate::error::NotificationError;

const TRANSPORT: &str = "amqp";

const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(500);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// RabbitMQ 消费者设置（构造前完成校验，之后不可变）
#[derive(Clone)]
pub struct RabbitConsumerSettings {
    uri: AMQPUri,
    /// 不含凭证的地址，仅用于日志
    endpoint: String,
    pub queue: String,
    pub prefetch: u16,
    pub consumer_tag: String,
    pub dead_letter_exchange: Option<String>,
    pub runtime: Handle,
}

impl RabbitConsumerSettings {
    pub fn from_config(
        config: &RabbitConfig,
        runtime: Handle,
    ) -> std::result::Result<Self, NotificationError> {
        if config.queue_name.trim().is_empty() {
            return Err(NotificationError::InvalidSettings(
                "queue_name 不能为空".to_string(),
            ));
        }
        if config.prefetch == 0 {
            return Err(NotificationError::InvalidSettings(
                "prefetch 必须大于 0".to_string(),
            ));
        }
        if config.host.trim().is_empty() {
            return Err(NotificationError::InvalidSettings(
                "host 不能为空".to_string(),
            ));
        }

        // 按字段构造，凭证中的保留字符无需转义
        let uri = AMQPUri {
            scheme: AMQPScheme::AMQP,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.username.clone(),
                    password: config.password.clone(),
                },
                host: config.host.clone(),
                port: config.port,
            },
            vhost: config.vhost.clone(),
            query: Default::default(),
        };

        Ok(Self {
            uri,
            endpoint: format!(
                "{}:{}/{}",
                config.host,
                config.port,
                config.vhost.replace('/', "%2f")
            ),
            queue: config.queue_name.clone(),
            prefetch: config.prefetch,
            consumer_tag: config.consumer_tag.clone(),
            dead_letter_exchange: config.dead_letter_exchange.clone(),
            runtime,
        })
    }

    /// 队列声明参数
    fn queue_arguments(&self) -> FieldTable {
        let mut arguments = FieldTable::default();
        if let Some(exchange) = &self.dead_letter_exchange {
            arguments.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString(exchange.as_str().into()),
            );
        }
        arguments
    }
}

/// 第 `attempt` 次重连前的等待时间（从 0 计数），指数增长并封顶
fn reconnect_delay(attempt: u32) -> Duration {
    RECONNECT_BASE_DELAY
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(RECONNECT_MAX_DELAY)
}

// ==================== 确认作用域 ====================

/// 消息确认接口，抽象 broker 侧的 ack / nack
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// 确认消息已处理
    async fn accept(&self) -> Result<()>;

    /// 拒收且不重新入队
    async fn discard(&self) -> Result<()>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn accept(&self) -> Result<()> {
        self.ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| ServiceError::transport(TRANSPORT, e))
    }

    async fn discard(&self) -> Result<()> {
        self.nack(BasicNackOptions {
            requeue: false,
            ..Default::default()
        })
        .await
        .map(|_| ())
        .map_err(|e| ServiceError::transport(TRANSPORT, e))
    }
}

/// 一条入站消息
pub struct InboundDelivery<A> {
    pub delivery_tag: u64,
    pub data: Vec<u8>,
    pub acker: A,
}

/// 消息最终的确认结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Discarded,
}

/// 确认作用域：`settle` 消费自身，保证每条消息只确认一次
pub struct AckScope<A: Acknowledger> {
    delivery_tag: u64,
    acker: A,
}

impl<A: Acknowledger> AckScope<A> {
    pub fn new(delivery_tag: u64, acker: A) -> Self {
        Self {
            delivery_tag,
            acker,
        }
    }

    pub async fn settle(
        self,
        outcome: &std::result::Result<(), NotificationError>,
    ) -> Settlement {
        let (settlement, result) = match outcome {
            Ok(()) => (Settlement::Acked, self.acker.accept().await),
            Err(_) => (Settlement::Discarded, self.acker.discard().await),
        };

        if let Err(e) = result {
            error!(
                delivery_tag = self.delivery_tag,
                settlement = ?settlement,
                error = %e,
                "消息确认失败"
            );
        }
        settlement
    }
}

/// 在确认作用域内处理一条消息
pub async fn process_delivery<A: Acknowledger>(
    dispatcher: &Dispatcher,
    delivery: InboundDelivery<A>,
) -> Settlement {
    let InboundDelivery {
        delivery_tag,
        data,
        acker,
    } = delivery;
    let scope = AckScope::new(delivery_tag, acker);

    let outcome = match AssertUnwindSafe(process_payload(dispatcher, TRANSPORT, &data))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            error!(delivery_tag, "处理消息时发生 panic");
            Err(NotificationError::Shared(ServiceError::Internal(
                "消息处理 panic".to_string(),
            )))
        }
    };

    scope.settle(&outcome).await
}

/// 消费消息流，直到流结束或收到关闭信号
///
/// 同时处理的消息数不超过 `prefetch`；收到关闭信号后不再拉取新消息，等待在途消息处理完成。
pub async fn consume<S, A, F>(deliveries: S, dispatcher: Dispatcher, prefetch: usize, shutdown: F)
where
    S: Stream<Item = InboundDelivery<A>>,
    A: Acknowledger,
    F: Future<Output = ()>,
{
    let dispatcher = &dispatcher;
    deliveries
        .take_until(shutdown)
        .for_each_concurrent(prefetch, |delivery| async move {
            let settlement = process_delivery(dispatcher, delivery).await;
            debug!(settlement = ?settlement, "消息处理完成");
        })
        .await;
}

// ==================== 会话管理 ====================

/// 可关闭的 AMQP 句柄（连接或通道）
#[async_trait]
trait AmqpClose: Send + Sync + 'static {
    async fn close_amqp(&self, reason: &str) -> lapin::Result<()>;
}

#[async_trait]
impl AmqpClose for Connection {
    async fn close_amqp(&self, reason: &str) -> lapin::Result<()> {
        self.close(200, reason).await
    }
}

#[async_trait]
impl AmqpClose for Channel {
    async fn close_amqp(&self, reason: &str) -> lapin::Result<()> {
        self.close(200, reason).await
    }
}

/// 建立会话期间持有的句柄
///
/// 在 `disarm` 之前被丢弃（出错返回或外层 future 被取消）时，在后台关闭句柄。
struct CloseOnDrop<T: AmqpClose> {
    handle: Arc<T>,
    runtime: Handle,
    armed: bool,
}

impl<T: AmqpClose> CloseOnDrop<T> {
    fn new(handle: T, runtime: Handle) -> Self {
        Self {
            handle: Arc::new(handle),
            runtime,
            armed: true,
        }
    }

    fn get(&self) -> &T {
        &self.handle
    }

    /// 会话建立完成，移交句柄所有权
    fn disarm(mut self) -> Arc<T> {
        self.armed = false;
        Arc::clone(&self.handle)
    }
}

impl<T: AmqpClose> Drop for CloseOnDrop<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let handle = Arc::clone(&self.handle);
        self.runtime.spawn(async move {
            if let Err(e) = handle.close_amqp("setup aborted").await {
                debug!(transport = TRANSPORT, error = %e, "释放未完成的 AMQP 句柄失败");
            }
        });
    }
}

/// 一次成功建立的 broker 会话
struct Session {
    connection: Arc<Connection>,
    channel: Arc<Channel>,
}

impl Session {
    async fn close(self, reason: &str) -> lapin::Result<()> {
        let channel = self.channel.close_amqp(reason).await;
        let connection = self.connection.close_amqp(reason).await;
        channel.and(connection)
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn inbound(consumer: lapin::Consumer) -> impl Stream<Item = InboundDelivery<Acker>> + Send {
    consumer.filter_map(|item| async move {
        match item {
            Ok(delivery) => Some(InboundDelivery {
                delivery_tag: delivery.delivery_tag,
                data: delivery.data,
                acker: delivery.acker,
            }),
            Err(e) => {
                error!(transport = TRANSPORT, error = %e, "接收消息失败");
                None
            }
        }
    })
}

/// 消费任务与生命周期共享的状态
struct Inner {
    settings: RabbitConsumerSettings,
    dispatcher: Dispatcher,
    session: Mutex<Option<Session>>,
    connected: AtomicBool,
}

impl Inner {
    fn new(settings: RabbitConsumerSettings, dispatcher: Dispatcher) -> Self {
        Self {
            settings,
            dispatcher,
            session: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        metrics::record_transport_connected(TRANSPORT, connected);
    }

    /// 建立连接、设置 QoS、声明队列并开始订阅
    async fn subscribe(&self) -> Result<(Session, lapin::Consumer)> {
        let amqp = |stage: &str, e: lapin::Error| {
            ServiceError::transport(TRANSPORT, format!("{stage}失败: {e}"))
        };
        let runtime = &self.settings.runtime;

        let connection =
            Connection::connect_uri(self.settings.uri.clone(), ConnectionProperties::default())
                .await
                .map_err(|e| {
                    ServiceError::transport(
                        TRANSPORT,
                        format!("连接 RabbitMQ 失败 ({}): {e}", self.settings.endpoint),
                    )
                })?;
        let connection = CloseOnDrop::new(connection, runtime.clone());

        let channel = connection
            .get()
            .create_channel()
            .await
            .map_err(|e| amqp("创建通道", e))?;
        let channel = CloseOnDrop::new(channel, runtime.clone());

        channel
            .get()
            .basic_qos(self.settings.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| amqp("设置 prefetch ", e))?;

        channel
            .get()
            .queue_declare(
                &self.settings.queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                self.settings.queue_arguments(),
            )
            .await
            .map_err(|e| amqp("声明队列", e))?;

        let consumer = channel
            .get()
            .basic_consume(
                &self.settings.queue,
                &self.settings.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| amqp("订阅队列", e))?;

        let session = Session {
            channel: channel.disarm(),
            connection: connection.disarm(),
        };
        Ok((session, consumer))
    }

    /// 消费任务主循环：消息流意外结束时重连，收到关闭信号时退出
    async fn run(self: Arc<Self>, consumer: lapin::Consumer, mut shutdown: watch::Receiver<bool>) {
        let prefetch = usize::from(self.settings.prefetch);
        let mut consumer = consumer;

        loop {
            let mut signal = shutdown.clone();
            consume(
                inbound(consumer),
                self.dispatcher.clone(),
                prefetch,
                async move { stopped(&mut signal).await },
            )
            .await;

            if *shutdown.borrow() {
                break;
            }

            self.set_connected(false);
            error!(
                transport = TRANSPORT,
                endpoint = %self.settings.endpoint,
                queue = %self.settings.queue,
                "RabbitMQ 消息流意外结束，开始重连"
            );

            match self.reconnect(&mut shutdown).await {
                Some(next) => consumer = next,
                None => break,
            }
        }
        debug!(transport = TRANSPORT, "消费任务退出");
    }

    /// 按指数退避重建会话；收到关闭信号时返回 None
    async fn reconnect(&self, shutdown: &mut watch::Receiver<bool>) -> Option<lapin::Consumer> {
        let mut attempt: u32 = 0;
        loop {
            let delay = reconnect_delay(attempt);
            attempt = attempt.saturating_add(1);

            tokio::select! {
                () = stopped(shutdown) => return None,
                () = tokio::time::sleep(delay) => {}
            }

            // 关闭信号到达时丢弃建立中的会话，未完成的句柄由 CloseOnDrop 回收
            let outcome = tokio::select! {
                () = stopped(shutdown) => return None,
                outcome = self.subscribe() => outcome,
            };

            match outcome {
                Ok((session, consumer)) => {
                    let stale = self.session.lock().replace(session);
                    if let Some(stale) = stale
                        && let Err(e) = stale.close("reconnected").await
                    {
                        debug!(transport = TRANSPORT, error = %e, "关闭失效会话失败");
                    }
                    self.set_connected(true);
                    info!(
                        transport = TRANSPORT,
                        endpoint = %self.settings.endpoint,
                        attempt,
                        "RabbitMQ 重连成功"
                    );
                    return Some(consumer);
                }
                Err(e) => {
                    warn!(
                        transport = TRANSPORT,
                        attempt,
                        retry_in_ms = reconnect_delay(attempt).as_millis() as u64,
                        error = %e,
                        "RabbitMQ 重连失败"
                    );
                }
            }
        }
    }
}

// ==================== 消费者 ====================

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct RabbitConsumer {
    inner: Arc<Inner>,
    state: StateCell,
    running: Mutex<Option<Running>>,
}

impl RabbitConsumer {
    pub fn new(settings: RabbitConsumerSettings, dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(Inner::new(settings, dispatcher)),
            state: StateCell::new("rabbit-consumer"),
            running: Mutex::new(None),
        }
    }

    /// 当前是否持有可用的 broker 会话（重连期间为 false）
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(Running { shutdown, task }) = running {
            let _ = shutdown.send(true);
            if let Err(e) = task.await {
                warn!(transport = TRANSPORT, error = %e, "消费任务退出异常");
            }
        }

        let session = self.inner.session.lock().take();
        self.inner.set_connected(false);
        if let Some(session) = session {
            if let Err(e) = session.close("consumer closing").await {
                warn!(transport = TRANSPORT, error = %e, "关闭 RabbitMQ 会话失败");
            }
            info!(transport = TRANSPORT, queue = %self.inner.settings.queue, "RabbitMQ 消费者已停止");
        }
    }
}

#[async_trait]
impl Lifecycle for RabbitConsumer {
    fn name(&self) -> &str {
        "rabbit-consumer"
    }

    async fn start(&self) -> Result<()> {
        self.state.begin_start()?;

        let (session, consumer) = match self.inner.subscribe().await {
            Ok(parts) => parts,
            Err(e) => {
                self.state.mark_failed();
                return Err(e);
            }
        };
        *self.inner.session.lock() = Some(session);
        self.inner.set_connected(true);

        let (tx, rx) = watch::channel(false);
        let task = self
            .inner
            .settings
            .runtime
            .spawn(Arc::clone(&self.inner).run(consumer, rx));
        *self.running.lock() = Some(Running { shutdown: tx, task });

        if !self.state.mark_running() {
            self.stop().await;
            return Err(ServiceError::Cancelled {
                unit: self.name().to_string(),
            });
        }

        let settings = &self.inner.settings;
        info!(
            transport = TRANSPORT,
            endpoint = %settings.endpoint,
            queue = %settings.queue,
            prefetch = settings.prefetch,
            "RabbitMQ 消费者已启动"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.state.begin_close().is_none() {
            self.state.wait_closed().await;
            return Ok(());
        }
        self.stop().await;
        self.state.mark_closed();
        Ok(())
    }
}

impl Consumer for RabbitConsumer {
    fn transport(&self) -> &'static str {
        TRANSPORT
    }

    fn state(&self) -> LifecycleState {
        self.state.get()
    }
}
