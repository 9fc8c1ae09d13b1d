//! CQRS 分发层统一错误定义
//!
//! 按阶段划分：配置校验、处理器注册、挂载路由器、单条消息处理。
//! 前三类在构建/启动阶段同步返回；单条消息错误由路由器转换为 Nack。
//!
use ddd_message::MessageError;
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CqrsError {
    // --- 配置 ---
    #[error("missing Marshaler")]
    MissingMarshaler,
    #[error("missing {missing} while {provided} is provided")]
    MissingPairedField {
        missing: &'static str,
        provided: &'static str,
    },
    #[error("missing {topic} and {subscriber}")]
    MissingSubscription {
        topic: &'static str,
        subscriber: &'static str,
    },
    #[error("missing GeneratePublishTopic")]
    MissingGeneratePublishTopic,

    // --- 注册 ---
    #[error("no handlers provided")]
    NoHandlers,
    #[error("event handler group '{0}' already exists")]
    DuplicateGroup(String),
    #[error("event handler '{0}' already exists")]
    DuplicateHandler(String),
    #[error("event handler group '{group}' has more than one handler for event '{event_name}'")]
    DuplicateGroupEvent { group: String, event_name: String },
    #[error("processor is already attached to a router")]
    AlreadyAttached,

    // --- 挂载 ---
    #[error("cannot generate topic for '{name}': {reason}")]
    GenerateTopic { name: String, reason: String },
    #[error("cannot create subscriber for '{name}': {reason}")]
    SubscriberConstructor { name: String, reason: String },
    #[error("cannot publish to '{topic}': {reason}")]
    Publish { topic: String, reason: String },
    #[error("transport error: {0}")]
    Message(#[from] MessageError),

    // --- 单条消息 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("cannot resolve event name of message '{message_uuid}'")]
    MissingEventName { message_uuid: String },
    #[error("no handler found for event '{event_name}' in group '{group}'")]
    UnknownEvent { group: String, event_name: String },
    #[error("received unexpected event '{received}', expected '{expected}'")]
    UnexpectedEvent { expected: String, received: String },
    #[error("type mismatch: expected={expected}")]
    TypeMismatch { expected: &'static str },
}

pub type CqrsResult<T> = Result<T, CqrsError>;
