//! 统一错误处理模块
//!
//! 定义各服务共享的基础设施错误类型，使用 thiserror 提供良好的错误信息。
//! 业务相关的错误（如投递失败）由各服务自行定义，并通过 `#[from]` 包装本类型。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum ServiceError {
    // ==================== 配置错误 ====================
    #[error("配置加载失败: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("配置无效: {0}")]
    InvalidConfig(String),

    // ==================== 传输层错误 ====================
    #[error("传输层错误: {transport} - {message}")]
    Transport { transport: String, message: String },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    // ==================== 存储错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    // ==================== 生命周期错误 ====================
    #[error("组件状态非法: {unit} 当前为 {state}，无法执行 {operation}")]
    InvalidState {
        unit: String,
        state: String,
        operation: String,
    },

    #[error("启动失败: {unit}")]
    Startup {
        unit: String,
        #[source]
        source: Box<ServiceError>,
    },

    #[error("启动任务被取消: {unit}")]
    Cancelled { unit: String },

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// 构造传输层错误
    pub fn transport(transport: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            transport: transport.into(),
            message: message.to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigLoad(_) => "CONFIG_LOAD_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Startup { .. } => "STARTUP_FAILED",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 启动失败时对应的组件名称
    pub fn failed_unit(&self) -> Option<&str> {
        match self {
            Self::Startup { unit, .. } => Some(unit),
            _ => None,
        }
    }
}
