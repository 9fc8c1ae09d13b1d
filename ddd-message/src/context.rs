use bon::Builder;
use tokio_util::sync::CancellationToken;

/// 消息上下文（Message Context）
///
/// 由路由器在分发每条消息前写入，随消息一路传递给处理钩子与业务处理器：
/// - 取消令牌（`cancellation`）：路由器关闭时被取消，处理器可据此提前结束；
/// - 处理器名称与主题：便于日志与审计。
///
/// 处理链路只克隆、不替换该上下文，确保调用方的取消语义原样传递。
///
/// ```rust
/// use ddd_message::MessageContext;
/// use tokio_util::sync::CancellationToken;
///
/// let ctx = MessageContext::builder()
///     .cancellation(CancellationToken::new())
///     .handler_name("orders".into())
///     .topic("events.orders".into())
///     .build();
/// assert_eq!(ctx.handler_name(), Some("orders"));
/// ```
#[derive(Builder, Clone, Debug, Default)]
pub struct MessageContext {
    #[builder(default)]
    cancellation: CancellationToken,
    handler_name: Option<String>,
    topic: Option<String>,
}

impl MessageContext {
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// 等待取消信号
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn handler_name(&self) -> Option<&str> {
        self.handler_name.as_deref()
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }
}
