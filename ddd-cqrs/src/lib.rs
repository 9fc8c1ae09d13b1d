//! 类型化事件分发引擎（ddd-cqrs）
//!
//! 在发布/订阅传输之上，把原始消息解码为强类型事件并分发给处理器：
//! - 事件（`event`）与编解码（`marshaler`）：事件名是分发的唯一依据；
//! - 处理器（`event_handler`）：以闭包构造，类型在注册时确定；
//! - 处理器组（`event_group_processor`）：多处理器共享订阅，按事件名分发；
//! - 独立处理器（`event_processor`）：每个处理器拥有独立订阅；
//! - 事件总线（`event_bus`）：发布侧，与处理器共用 `Marshaler`。
//!
//! 典型用法：
//! 1. 为事件派生 `Event`，用 `new_group_event_handler` 等构造处理器；
//! 2. 构建处理器配置（主题生成、订阅者构造、`Marshaler`）并创建处理器；
//! 3. 注册处理器组/处理器，挂载到 `ddd_message::Router` 后运行路由器；
//! 4. 通过 `EventBus` 发布事件。
//!
pub mod error;
pub mod event;
pub mod event_bus;
pub mod event_group_processor;
pub mod event_handler;
pub mod event_processor;
pub mod marshaler;

pub use ddd_macros::Event;
pub use error::{CqrsError, CqrsResult};
pub use event::{Event, EventType};
pub use event_bus::{EventBus, EventBusConfig};
pub use event_group_processor::{EventGroupProcessor, EventGroupProcessorConfig};
pub use event_handler::{
    BoxedEvent, EventHandler, FnEventHandler, GroupEventHandler, new_event_handler,
    new_group_event_handler,
};
pub use event_processor::{EventProcessor, EventProcessorConfig};
pub use marshaler::{JsonMarshaler, Marshaler, NameStrategy};
