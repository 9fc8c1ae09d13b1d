//! 消息路由器（Router）
//!
//! 统一编排“订阅 → 处理 → Ack/Nack”的长驻任务：
//! - 注册阶段登记具名处理函数及其主题与订阅者；
//! - `run` 为每个处理函数订阅主题，并在独立任务中顺序消费；
//! - 处理函数返回 `Ok` 时确认消息，返回 `Err` 或发生 panic 时拒绝消息，
//!   每条消息恰好写入一次结果；
//! - `close` 触发取消，进行中的处理完成后任务退出并关闭订阅者。
//!
use crate::context::MessageContext;
use crate::error::{MessageError, MessageResult as Result};
use crate::message::Message;
use crate::pubsub::Subscriber;
use futures_core::stream::BoxStream;
use futures_util::{FutureExt, StreamExt, future::BoxFuture};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// 不产生后续消息的处理函数：返回值决定消息的 Ack/Nack
pub type NoPublishHandlerFunc = Arc<dyn Fn(Message) -> HandlerFuture + Send + Sync>;

/// 路由器配置
#[derive(Clone, Copy, Debug)]
pub struct RouterConfig {
    /// 关闭时等待进行中处理结束的最长时间
    pub close_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
struct RouterHandler {
    name: String,
    topic: String,
    subscriber: Arc<dyn Subscriber>,
    handler: NoPublishHandlerFunc,
}

pub struct Router {
    config: RouterConfig,
    handlers: Mutex<Vec<RouterHandler>>,
    token: CancellationToken,
    running: watch::Sender<bool>,
    started: AtomicBool,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        let (running, _rx) = watch::channel(false);
        Self {
            config,
            handlers: Mutex::new(Vec::new()),
            token: CancellationToken::new(),
            running,
            started: AtomicBool::new(false),
        }
    }

    /// 注册处理函数；名称在路由器内唯一，运行后不可再注册
    pub fn add_no_publisher_handler(
        &self,
        name: impl Into<String>,
        topic: impl Into<String>,
        subscriber: Arc<dyn Subscriber>,
        handler: NoPublishHandlerFunc,
    ) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            return Err(MessageError::RouterAlreadyRunning);
        }

        let name = name.into();
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        if handlers.iter().any(|h| h.name == name) {
            return Err(MessageError::DuplicateHandler { name });
        }

        let topic = topic.into();
        debug!(handler = %name, topic = %topic, "router handler added");
        handlers.push(RouterHandler {
            name,
            topic,
            subscriber,
            handler,
        });

        Ok(())
    }

    /// 已注册处理函数的名称（按注册顺序）
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|h| h.name.clone())
            .collect()
    }

    /// 启动全部处理任务并阻塞至 `close` 被调用
    pub async fn run(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(MessageError::RouterAlreadyRunning);
        }

        let handlers = std::mem::take(
            &mut *self.handlers.lock().unwrap_or_else(PoisonError::into_inner),
        );

        // 先完成全部订阅，任一失败则不启动任何任务
        let mut streams = Vec::with_capacity(handlers.len());
        for h in &handlers {
            match h.subscriber.subscribe(&h.topic).await {
                Ok(stream) => streams.push(stream),
                Err(err) => {
                    error!(handler = %h.name, topic = %h.topic, error = %err, "subscribe failed");
                    // 唤醒等待 running() 的调用方
                    self.token.cancel();
                    return Err(err);
                }
            }
        }

        let mut tasks: Vec<JoinHandle<()>> = handlers
            .iter()
            .cloned()
            .zip(streams)
            .map(|(h, stream)| tokio::spawn(Self::consume(h, stream, self.token.clone())))
            .collect();

        self.running.send_replace(true);
        info!(handlers = handlers.len(), "router running");

        self.token.cancelled().await;
        info!("router closing");

        let joined = tokio::time::timeout(self.config.close_timeout, async {
            for t in tasks.iter_mut() {
                let _ = t.await;
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                timeout = ?self.config.close_timeout,
                "close timed out, aborting in-flight handlers"
            );
            // 超时后中止处理任务，返回后不会再有消息被 Ack/Nack
            for t in &tasks {
                t.abort();
            }
            for t in tasks {
                let _ = t.await;
            }
        }

        for h in &handlers {
            if let Err(err) = h.subscriber.close().await {
                warn!(handler = %h.name, error = %err, "failed to close subscriber");
            }
        }

        self.running.send_replace(false);

        match joined {
            Ok(()) => {
                info!("router closed");
                Ok(())
            }
            Err(_) => Err(MessageError::CloseTimeout(self.config.close_timeout)),
        }
    }

    /// 等待路由器进入运行状态
    ///
    /// 返回 `false` 表示路由器未能运行：启动失败或在运行前已被关闭。
    pub async fn running(&self) -> bool {
        let mut rx = self.running.subscribe();
        tokio::select! {
            biased;
            res = rx.wait_for(|running| *running) => res.is_ok(),
            _ = self.token.cancelled() => false,
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    async fn consume(
        handler: RouterHandler,
        mut stream: BoxStream<'static, Message>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    break;
                }
                maybe_msg = stream.next() => {
                    match maybe_msg {
                        Some(msg) => Self::handle_message(&handler, msg, &token).await,
                        None => {
                            debug!(handler = %handler.name, "subscription stream ended");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_message(handler: &RouterHandler, mut msg: Message, token: &CancellationToken) {
        let ctx = MessageContext::builder()
            .cancellation(token.child_token())
            .handler_name(handler.name.clone())
            .topic(handler.topic.clone())
            .build();
        msg.set_context(ctx);

        let fut = (handler.handler)(msg.clone());
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {
                msg.ack();
                debug!(handler = %handler.name, message_uuid = %msg.uuid(), "message acked");
            }
            Ok(Err(err)) => {
                error!(
                    handler = %handler.name,
                    message_uuid = %msg.uuid(),
                    error = %err,
                    "handler returned error, message nacked"
                );
                msg.nack();
            }
            Err(_) => {
                error!(
                    handler = %handler.name,
                    message_uuid = %msg.uuid(),
                    "handler panicked, message nacked"
                );
                msg.nack();
            }
        }
    }
}
