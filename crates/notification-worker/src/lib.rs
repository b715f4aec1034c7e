//! 通知服务
//!
//! 通过 gRPC 与 RabbitMQ 两种传输层接收通知请求，解码为统一的消息模型，
//! 按消息类型路由到对应的 Handler，并依次尝试配置的 Provider 完成投递。

pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod provider;
pub mod registry;

pub use dispatcher::{Dispatcher, UnroutablePolicy};
pub use error::{NotificationError, ProviderError};
pub use handler::Handler;
pub use message::{EmailMessage, MessageKind, NotificationMessage, SmsMessage};
pub use registry::Registry;
