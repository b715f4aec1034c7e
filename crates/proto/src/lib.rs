//! gRPC 协议定义
//!
//! 由 `proto/notification.proto` 在构建期生成。

pub mod notification {
    tonic::include_proto!("notification");
}
