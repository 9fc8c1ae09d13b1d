//! 内存版发布/订阅（InMemoryPubSub）
//!
//! 基于 `tokio::sync::mpsc` 的轻量实现，同时满足 `Publisher` 与 `Subscriber` 协议：
//! - `publish`：向主题下每个订阅者投递一份 `Message::copy`，各自拥有独立的 Ack 信号；
//! - `subscribe`：返回 `'static` 生命周期消息流；
//! - `close`：清空全部订阅，已有消息流随之结束。
//!
//! 注意：主题下无订阅者时发布的消息将被丢弃，不做持久化。

use crate::error::{MessageError, MessageResult as Result};
use crate::message::Message;
use crate::pubsub::{Publisher, Subscriber};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_core::stream::BoxStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Clone, Default)]
pub struct InMemoryPubSub {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    topics: DashMap<String, Vec<mpsc::UnboundedSender<Message>>>,
    closed: AtomicBool,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 主题当前的订阅者数量
    pub fn subscribers(&self, topic: &str) -> usize {
        self.inner.topics.get(topic).map_or(0, |subs| subs.len())
    }
}

#[async_trait]
impl Publisher for InMemoryPubSub {
    async fn publish(&self, topic: &str, messages: Vec<Message>) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(MessageError::Closed);
        }

        let Some(mut subs) = self.inner.topics.get_mut(topic) else {
            tracing::trace!(topic, "no subscribers, messages dropped");
            return Ok(());
        };

        for msg in &messages {
            // 订阅流已被丢弃的发送端顺带清理
            subs.retain(|tx| tx.send(msg.copy()).is_ok());
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.topics.clear();
        Ok(())
    }
}

#[async_trait]
impl Subscriber for InMemoryPubSub {
    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, Message>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(MessageError::Closed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(tx);

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn close(&self) -> Result<()> {
        Publisher::close(self).await
    }
}
