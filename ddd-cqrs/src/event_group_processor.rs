//! 事件处理器组（EventGroupProcessor）
//!
//! 多个处理器共享同一主题与订阅（“组”），每条消息按事件名只分发给组内唯一匹配的处理器：
//! - 注册阶段构建 `事件名 -> 处理器` 映射，组内事件名重复视为配置错误；
//! - 挂载阶段为每个组生成主题、创建订阅者，并向路由器注册一个处理函数；
//! - 运行阶段：解析事件名 → 查找处理器 → 解码 → （可选）钩子 → 处理器，
//!   结果决定消息的 Ack/Nack。
//!
//! 未知事件默认拒绝（Nack），开启 `ack_on_unknown_event` 后直接确认且不调用任何处理器。
//!
use crate::error::{CqrsError, CqrsResult as Result};
use crate::event_handler::{BoxedEvent, GroupEventHandler};
use crate::marshaler::Marshaler;
use bon::Builder;
use ddd_message::{HandlerFuture, Message, NoPublishHandlerFunc, Router, Subscriber};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{Span, debug, info, trace};

// 导入由 bon::Builder 生成的 typestate 模块与状态转换别名
use self::event_group_processor_config_builder::{
    IsUnset, SetGenerateTopic, SetOnHandle, SetSubscriberConstructor, State as BuilderState,
};

/// 生成组订阅主题时的描述参数
pub struct GenerateEventHandlerGroupTopicParams<'a> {
    pub event_group_name: &'a str,
    pub event_group_handlers: &'a [Arc<dyn GroupEventHandler>],
}

/// 创建组订阅者时的描述参数
pub struct EventsGroupSubscriberConstructorParams<'a> {
    pub event_group_name: &'a str,
    pub event_group_handlers: &'a [Arc<dyn GroupEventHandler>],
}

/// 组分发钩子的参数：包含完整的分发上下文
pub struct OnGroupEventHandleParams {
    pub group_name: String,
    pub handler: Arc<dyn GroupEventHandler>,
    pub event_name: String,
    pub event: BoxedEvent,
    pub message: Message,
}

pub type GenerateEventHandlerGroupTopicFn = Arc<
    dyn Fn(GenerateEventHandlerGroupTopicParams<'_>) -> anyhow::Result<String> + Send + Sync,
>;

pub type EventsGroupSubscriberConstructorFn = Arc<
    dyn Fn(EventsGroupSubscriberConstructorParams<'_>) -> anyhow::Result<Arc<dyn Subscriber>>
        + Send
        + Sync,
>;

pub type OnGroupEventHandleFn = Arc<dyn Fn(OnGroupEventHandleParams) -> HandlerFuture + Send + Sync>;

/// 处理器组配置
#[derive(Builder, Clone)]
pub struct EventGroupProcessorConfig {
    #[builder(setters(vis = "pub(crate)"))]
    generate_topic: Option<GenerateEventHandlerGroupTopicFn>,
    #[builder(setters(vis = "pub(crate)"))]
    subscriber_constructor: Option<EventsGroupSubscriberConstructorFn>,
    #[builder(setters(vis = "pub(crate)"))]
    on_handle: Option<OnGroupEventHandleFn>,
    /// 未知事件是否直接确认（默认拒绝）
    #[builder(default)]
    ack_on_unknown_event: bool,
    marshaler: Option<Arc<dyn Marshaler>>,
    /// 处理器日志的父 span
    #[builder(default = tracing::info_span!("event_group_processor"))]
    logger: Span,
}

// 自定义 Builder 方法：接收闭包并装箱，使闭包参数的生命周期可被正确推导。
impl<S: BuilderState> EventGroupProcessorConfigBuilder<S> {
    pub fn generate_handler_group_subscribe_topic<F>(
        self,
        f: F,
    ) -> EventGroupProcessorConfigBuilder<SetGenerateTopic<S>>
    where
        F: Fn(GenerateEventHandlerGroupTopicParams<'_>) -> anyhow::Result<String>
            + Send
            + Sync
            + 'static,
        <S as BuilderState>::GenerateTopic: IsUnset,
    {
        self.generate_topic(Arc::new(f))
    }

    pub fn group_subscriber_constructor<F>(
        self,
        f: F,
    ) -> EventGroupProcessorConfigBuilder<SetSubscriberConstructor<S>>
    where
        F: Fn(EventsGroupSubscriberConstructorParams<'_>) -> anyhow::Result<Arc<dyn Subscriber>>
            + Send
            + Sync
            + 'static,
        <S as BuilderState>::SubscriberConstructor: IsUnset,
    {
        self.subscriber_constructor(Arc::new(f))
    }

    /// 设置组分发钩子：钩子代替处理器被调用，需自行调用处理器以执行正常处理
    pub fn on_group_handle<F, Fut>(self, f: F) -> EventGroupProcessorConfigBuilder<SetOnHandle<S>>
    where
        F: Fn(OnGroupEventHandleParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        <S as BuilderState>::OnHandle: IsUnset,
    {
        self.on_handle(Arc::new(
            move |params: OnGroupEventHandleParams| -> HandlerFuture { Box::pin(f(params)) },
        ))
    }
}

impl EventGroupProcessorConfig {
    /// 结构校验，无副作用，可重复调用
    pub fn validate(&self) -> Result<()> {
        self.parts().map(|_| ())
    }

    fn parts(
        &self,
    ) -> Result<(
        Arc<dyn Marshaler>,
        GenerateEventHandlerGroupTopicFn,
        EventsGroupSubscriberConstructorFn,
    )> {
        let Some(marshaler) = self.marshaler.clone() else {
            return Err(CqrsError::MissingMarshaler);
        };

        match (&self.generate_topic, &self.subscriber_constructor) {
            (Some(generate_topic), Some(subscriber_constructor)) => Ok((
                marshaler,
                generate_topic.clone(),
                subscriber_constructor.clone(),
            )),
            (Some(_), None) => Err(CqrsError::MissingPairedField {
                missing: "GroupSubscriberConstructor",
                provided: "GenerateHandlerGroupTopic",
            }),
            (None, Some(_)) => Err(CqrsError::MissingPairedField {
                missing: "GenerateHandlerGroupTopic",
                provided: "GroupSubscriberConstructor",
            }),
            (None, None) => Err(CqrsError::MissingSubscription {
                topic: "GenerateHandlerGroupTopic",
                subscriber: "GroupSubscriberConstructor",
            }),
        }
    }
}

/// 处理器组：注册时构建事件名索引，之后只读
struct HandlerGroup {
    name: String,
    handlers: Vec<Arc<dyn GroupEventHandler>>,
    by_event_name: HashMap<String, Arc<dyn GroupEventHandler>>,
}

pub struct EventGroupProcessor {
    groups: Vec<Arc<HandlerGroup>>,
    attached: bool,
    marshaler: Arc<dyn Marshaler>,
    generate_topic: GenerateEventHandlerGroupTopicFn,
    subscriber_constructor: EventsGroupSubscriberConstructorFn,
    config: EventGroupProcessorConfig,
}

impl EventGroupProcessor {
    pub fn new(config: EventGroupProcessorConfig) -> Result<Self> {
        let (marshaler, generate_topic, subscriber_constructor) = config.parts()?;

        Ok(Self {
            groups: Vec::new(),
            attached: false,
            marshaler,
            generate_topic,
            subscriber_constructor,
            config,
        })
    }

    /// 注册处理器组；组名在本处理器内唯一，处理器顺序保持不变
    pub fn add_handlers_group(
        &mut self,
        group_name: impl Into<String>,
        handlers: Vec<Arc<dyn GroupEventHandler>>,
    ) -> Result<()> {
        if self.attached {
            return Err(CqrsError::AlreadyAttached);
        }

        let group_name = group_name.into();
        if handlers.is_empty() {
            return Err(CqrsError::NoHandlers);
        }
        if self.groups.iter().any(|g| g.name == group_name) {
            return Err(CqrsError::DuplicateGroup(group_name));
        }

        let mut by_event_name = HashMap::with_capacity(handlers.len());
        for handler in &handlers {
            let event_name = self.marshaler.name(handler.event_type());
            if by_event_name.contains_key(&event_name) {
                return Err(CqrsError::DuplicateGroupEvent {
                    group: group_name,
                    event_name,
                });
            }
            by_event_name.insert(event_name, handler.clone());
        }

        debug!(
            parent: &self.config.logger,
            group = %group_name,
            handlers = handlers.len(),
            "event handler group added"
        );

        self.groups.push(Arc::new(HandlerGroup {
            name: group_name,
            handlers,
            by_event_name,
        }));

        Ok(())
    }

    /// 为每个组生成主题与订阅者，并向路由器注册分发函数
    ///
    /// 全部主题与订阅者就绪后才开始注册，任一步失败时路由器保持不变。
    pub fn add_handlers_to_router(&mut self, router: &Router) -> Result<()> {
        if self.attached {
            return Err(CqrsError::AlreadyAttached);
        }

        let mut prepared = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let topic = (self.generate_topic)(GenerateEventHandlerGroupTopicParams {
                event_group_name: &group.name,
                event_group_handlers: &group.handlers,
            })
            .map_err(|err| CqrsError::GenerateTopic {
                name: group.name.clone(),
                reason: format!("{err:#}"),
            })?;

            let subscriber = (self.subscriber_constructor)(EventsGroupSubscriberConstructorParams {
                event_group_name: &group.name,
                event_group_handlers: &group.handlers,
            })
            .map_err(|err| CqrsError::SubscriberConstructor {
                name: group.name.clone(),
                reason: format!("{err:#}"),
            })?;

            prepared.push((group.clone(), topic, subscriber));
        }

        let existing = router.handler_names();
        if let Some((group, _, _)) = prepared.iter().find(|(g, _, _)| existing.contains(&g.name)) {
            return Err(ddd_message::MessageError::DuplicateHandler {
                name: group.name.clone(),
            }
            .into());
        }

        for (group, topic, subscriber) in prepared {
            info!(
                parent: &self.config.logger,
                group = %group.name,
                topic = %topic,
                "adding event handler group to router"
            );
            let name = group.name.clone();
            router.add_no_publisher_handler(name, topic, subscriber, self.router_handler(group))?;
        }

        self.attached = true;
        Ok(())
    }

    fn router_handler(&self, group: Arc<HandlerGroup>) -> NoPublishHandlerFunc {
        let dispatcher = Arc::new(GroupDispatcher {
            group,
            marshaler: self.marshaler.clone(),
            on_handle: self.config.on_handle.clone(),
            ack_on_unknown_event: self.config.ack_on_unknown_event,
            logger: self.config.logger.clone(),
        });

        Arc::new(move |msg: Message| -> HandlerFuture {
            let dispatcher = dispatcher.clone();
            Box::pin(async move { dispatcher.dispatch(msg).await })
        })
    }
}

struct GroupDispatcher {
    group: Arc<HandlerGroup>,
    marshaler: Arc<dyn Marshaler>,
    on_handle: Option<OnGroupEventHandleFn>,
    ack_on_unknown_event: bool,
    logger: Span,
}

impl GroupDispatcher {
    async fn dispatch(&self, msg: Message) -> anyhow::Result<()> {
        let Some(event_name) = self.marshaler.name_from_message(&msg) else {
            return self.unknown_event(
                &msg,
                CqrsError::MissingEventName {
                    message_uuid: msg.uuid().to_string(),
                },
            );
        };

        let Some(handler) = self.group.by_event_name.get(&event_name).cloned() else {
            return self.unknown_event(
                &msg,
                CqrsError::UnknownEvent {
                    group: self.group.name.clone(),
                    event_name,
                },
            );
        };

        let payload = self.marshaler.unmarshal(&msg)?;
        let event = handler.decode(payload)?;

        debug!(
            parent: &self.logger,
            group = %self.group.name,
            event_name = %event_name,
            message_uuid = %msg.uuid(),
            "handling event"
        );

        match &self.on_handle {
            Some(on_handle) => {
                on_handle(OnGroupEventHandleParams {
                    group_name: self.group.name.clone(),
                    handler,
                    event_name,
                    event,
                    message: msg,
                })
                .await
            }
            None => handler.handle(msg.context(), event).await,
        }
    }

    fn unknown_event(&self, msg: &Message, err: CqrsError) -> anyhow::Result<()> {
        if !self.ack_on_unknown_event {
            return Err(err.into());
        }

        trace!(
            parent: &self.logger,
            group = %self.group.name,
            message_uuid = %msg.uuid(),
            reason = %err,
            "event can't be handled by any handler in group, acking"
        );
        Ok(())
    }
}
