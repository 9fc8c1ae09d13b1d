//! 消息编解码（Marshaler）
//!
//! 约定事件与传输消息之间的转换，以及事件名的推导：
//! - `marshal`：将事件负载封装为消息，并把事件名写入元数据；
//! - `unmarshal`：从消息中还原负载，具体类型由处理器负责；
//! - `name` / `name_from_message`：分别从类型描述与已编码消息中取得事件名，
//!   两者对同一事件必须一致，组内分发依赖这一点。
//!
//! 负载以 `serde_json::Value` 作为中间形态，使 `Marshaler` 保持对象安全，
//! 可以 `Arc<dyn Marshaler>` 的形式注入各处理器配置。
//!
use crate::error::CqrsResult as Result;
use crate::event::{Event, EventType};
use ddd_message::Message;
use serde_json::Value;

/// 事件名在消息元数据中的键
pub const NAME_METADATA_KEY: &str = "name";

pub trait Marshaler: Send + Sync {
    fn marshal(&self, event_type: EventType, payload: &Value) -> Result<Message>;

    fn unmarshal(&self, msg: &Message) -> Result<Value>;

    fn name(&self, event_type: EventType) -> String;

    fn name_from_message(&self, msg: &Message) -> Option<String>;
}

/// 将强类型事件编码为消息
pub fn marshal_event<E: Event>(marshaler: &dyn Marshaler, event: &E) -> Result<Message> {
    let payload = serde_json::to_value(event)?;
    marshaler.marshal(EventType::of::<E>(), &payload)
}

/// 将消息解码为强类型事件
pub fn unmarshal_event<E: Event>(marshaler: &dyn Marshaler, msg: &Message) -> Result<E> {
    let payload = marshaler.unmarshal(msg)?;
    Ok(serde_json::from_value(payload)?)
}

/// 事件名生成策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NameStrategy {
    /// 使用 `Event::NAME`
    #[default]
    Declared,
    /// 使用完整类型路径
    FullyQualified,
    /// 使用不含模块路径的类型名
    TypeName,
}

/// JSON 编解码实现
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonMarshaler {
    name_strategy: NameStrategy,
}

impl JsonMarshaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name_strategy(name_strategy: NameStrategy) -> Self {
        Self { name_strategy }
    }
}

impl Marshaler for JsonMarshaler {
    fn marshal(&self, event_type: EventType, payload: &Value) -> Result<Message> {
        let mut msg = Message::with_random_uuid(serde_json::to_vec(payload)?);
        msg.metadata_mut()
            .set(NAME_METADATA_KEY, self.name(event_type));
        Ok(msg)
    }

    fn unmarshal(&self, msg: &Message) -> Result<Value> {
        Ok(serde_json::from_slice(msg.payload())?)
    }

    fn name(&self, event_type: EventType) -> String {
        match self.name_strategy {
            NameStrategy::Declared => event_type.name().to_string(),
            NameStrategy::FullyQualified => event_type.type_name().to_string(),
            NameStrategy::TypeName => event_type.short_type_name().to_string(),
        }
    }

    fn name_from_message(&self, msg: &Message) -> Option<String> {
        msg.metadata()
            .get(NAME_METADATA_KEY)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}
