//! 事件处理器（EventHandler / GroupEventHandler）
//!
//! 处理器把一种具体事件类型、解码逻辑与业务函数绑定在一起：
//! - `GroupEventHandler`：组内使用，按事件名被选中，无需独立名称；
//! - `EventHandler`：独占订阅，额外提供处理器名称（用于诊断与消费组命名）。
//!
//! 处理器在分发链路中以类型擦除的方式传递事件（`BoxedEvent`），
//! 由具体实现负责还原为强类型后调用业务函数。
//!
use crate::error::{CqrsError, CqrsResult};
use crate::event::{Event, EventType};
use async_trait::async_trait;
use ddd_message::MessageContext;
use serde_json::Value;
use std::any::{Any, type_name};
use std::future::Future;
use std::marker::PhantomData;

/// 已解码、类型擦除的事件
pub type BoxedEvent = Box<dyn Any + Send + Sync>;

#[async_trait]
pub trait GroupEventHandler: Send + Sync {
    /// 处理器负责的事件类型
    fn event_type(&self) -> EventType;

    /// 将负载解码为一个新的事件值
    fn decode(&self, payload: Value) -> CqrsResult<BoxedEvent>;

    /// 处理已解码的事件；返回错误时消息被拒绝
    async fn handle(&self, ctx: &MessageContext, event: BoxedEvent) -> anyhow::Result<()>;
}

pub trait EventHandler: GroupEventHandler {
    /// 处理器名称，在所属处理器（Processor）内唯一
    fn handler_name(&self) -> &str;
}

/// 以闭包实现的处理器，由 [`new_event_handler`] / [`new_group_event_handler`] 构造
pub struct FnEventHandler<E, F> {
    name: String,
    handle: F,
    _event: PhantomData<fn() -> E>,
}

/// 创建具名事件处理器，可用于 `EventProcessor`，也可加入处理器组
///
/// ```rust
/// use ddd_cqrs::{Event, new_event_handler};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct OrderPlaced {
///     order_id: String,
/// }
///
/// impl Event for OrderPlaced {
///     const NAME: &'static str = "OrderPlaced";
/// }
///
/// let handler = new_event_handler("OnOrderPlaced", |_ctx, event: OrderPlaced| async move {
///     anyhow::ensure!(!event.order_id.is_empty(), "empty order_id");
///     Ok(())
/// });
/// ```
pub fn new_event_handler<E, F, Fut>(name: impl Into<String>, handle: F) -> FnEventHandler<E, F>
where
    E: Event,
    F: Fn(MessageContext, E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnEventHandler {
        name: name.into(),
        handle,
        _event: PhantomData,
    }
}

/// 创建组内事件处理器；名称取 `Event::NAME`，仅用于诊断
pub fn new_group_event_handler<E, F, Fut>(handle: F) -> FnEventHandler<E, F>
where
    E: Event,
    F: Fn(MessageContext, E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    new_event_handler(E::NAME, handle)
}

#[async_trait]
impl<E, F, Fut> GroupEventHandler for FnEventHandler<E, F>
where
    E: Event,
    F: Fn(MessageContext, E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn event_type(&self) -> EventType {
        EventType::of::<E>()
    }

    fn decode(&self, payload: Value) -> CqrsResult<BoxedEvent> {
        let event: E = serde_json::from_value(payload)?;
        Ok(Box::new(event))
    }

    async fn handle(&self, ctx: &MessageContext, event: BoxedEvent) -> anyhow::Result<()> {
        // 正常情况下 downcast 不会失败：事件由同一处理器的 decode 产生
        let event = event
            .downcast::<E>()
            .map_err(|_| CqrsError::TypeMismatch {
                expected: type_name::<E>(),
            })?;
        (self.handle)(ctx.clone(), *event).await
    }
}

impl<E, F, Fut> EventHandler for FnEventHandler<E, F>
where
    E: Event,
    F: Fn(MessageContext, E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handler_name(&self) -> &str {
        &self.name
    }
}
