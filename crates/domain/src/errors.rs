//! 领域模型错误定义

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 未知的线路事件
    #[error("未知事件: {event}")]
    UnknownEvent { event: String },

    /// 事件负载格式不符合约定
    #[error("事件 {event} 负载无效: {message}")]
    InvalidPayload { event: String, message: String },
}

impl DomainError {
    /// 创建未知事件错误
    pub fn unknown_event(event: impl Into<String>) -> Self {
        Self::UnknownEvent {
            event: event.into(),
        }
    }

    /// 创建负载无效错误
    pub fn invalid_payload(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event: event.into(),
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
