//! 传输层统一错误定义
//!
use std::time::Duration;
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MessageError {
    // --- 发布/订阅 ---
    #[error("pub/sub is closed")]
    Closed,
    #[error("publish failed: topic={topic}, reason={reason}")]
    Publish { topic: String, reason: String },
    #[error("subscribe failed: topic={topic}, reason={reason}")]
    Subscribe { topic: String, reason: String },

    // --- 路由器 ---
    #[error("router handler '{name}' already exists")]
    DuplicateHandler { name: String },
    #[error("router is already running")]
    RouterAlreadyRunning,
    #[error("router close timed out after {0:?}")]
    CloseTimeout(Duration),
}

impl MessageError {
    pub fn subscribe(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        MessageError::Subscribe {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub fn publish(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        MessageError::Publish {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

pub type MessageResult<T> = Result<T, MessageError>;
