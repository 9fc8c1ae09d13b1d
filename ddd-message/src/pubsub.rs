//! 发布/订阅（Publisher / Subscriber）协议
//!
//! 定义消息发布与订阅的统一抽象；订阅返回 'static 生命周期的消息流，
//! 以便在 tokio::spawn 中消费。具体中间件通过实现这两个 trait 接入路由器。
//!
use crate::{error::MessageResult as Result, message::Message};
use async_trait::async_trait;
use futures_core::stream::BoxStream;

/// 发布者：将消息写入指定主题
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, messages: Vec<Message>) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// 订阅者：返回指定主题上惰性、近似无限且不可重启的消息流
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, Message>>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
