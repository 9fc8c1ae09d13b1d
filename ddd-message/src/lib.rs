//! 消息传输基础库（ddd-message）
//!
//! 为 CQRS 分发引擎提供与具体中间件无关的传输侧构件：
//! - 消息（`message`）：负载、元数据与一次性 Ack/Nack 信号；
//! - 消息上下文（`context`）：取消令牌与处理器/主题等路由信息；
//! - 发布/订阅协议（`pubsub`）与内存实现（`pubsub_inmemory`）；
//! - 路由器（`router`）：为每个订阅启动独立任务，按处理结果 Ack/Nack。
//!
//! 真实的消息系统（Redis Stream、Kafka 等）只需实现 `Publisher`/`Subscriber`
//! 即可接入路由器与上层处理器。
//!
pub mod context;
pub mod error;
pub mod message;
pub mod pubsub;
pub mod pubsub_inmemory;
pub mod router;

pub use context::MessageContext;
pub use error::{MessageError, MessageResult};
pub use message::{AckState, Message, Metadata};
pub use pubsub::{Publisher, Subscriber};
pub use pubsub_inmemory::InMemoryPubSub;
pub use router::{HandlerFuture, NoPublishHandlerFunc, Router, RouterConfig};
