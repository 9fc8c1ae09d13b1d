#![allow(dead_code)]

use async_trait::async_trait;
use ddd_message::{AckState, Message, MessageResult, Router, Subscriber};
use futures_core::stream::BoxStream;
use futures_util::{StreamExt, stream};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(2);

/// 依次吐出预置消息，随后保持挂起；克隆的消息与测试共享 Ack 信号
pub struct StaticSubscriber {
    messages: Vec<Message>,
}

impl StaticSubscriber {
    pub fn shared(messages: &[Message]) -> Arc<dyn Subscriber> {
        Arc::new(Self {
            messages: messages.to_vec(),
        })
    }
}

#[async_trait]
impl Subscriber for StaticSubscriber {
    async fn subscribe(&self, _topic: &str) -> MessageResult<BoxStream<'static, Message>> {
        Ok(Box::pin(
            stream::iter(self.messages.clone()).chain(stream::pending()),
        ))
    }
}

pub async fn start(router: Arc<Router>) -> JoinHandle<MessageResult<()>> {
    let runner = {
        let router = router.clone();
        tokio::spawn(async move { router.run().await })
    };
    let running = tokio::time::timeout(WAIT, router.running())
        .await
        .expect("router did not start");
    assert!(running, "router failed to start");
    runner
}

pub async fn stop(router: &Router, runner: JoinHandle<MessageResult<()>>) {
    router.close();
    runner
        .await
        .expect("router task panicked")
        .expect("router returned error");
}

pub async fn outcome(msg: &Message) -> AckState {
    tokio::time::timeout(WAIT, msg.outcome())
        .await
        .expect("message was neither acked nor nacked")
}
