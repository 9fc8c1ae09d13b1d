//! 事件处理器（EventProcessor）
//!
//! 每个处理器独占一个订阅：主题与订阅者按处理器分别生成，
//! 消息无需查找即可直接解码并交给对应处理器。
//!
//! 主题上出现其他类型的事件时，按 `ack_on_unknown_event` 决定确认或拒绝，
//! 处理器本身不会被调用。
//!
use crate::error::{CqrsError, CqrsResult as Result};
use crate::event_handler::{BoxedEvent, EventHandler};
use crate::marshaler::Marshaler;
use bon::Builder;
use ddd_message::{HandlerFuture, Message, MessageError, NoPublishHandlerFunc, Router, Subscriber};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{Span, debug, info, trace};

use self::event_processor_config_builder::{
    IsUnset, SetCreateSubscriber, SetGenerateTopic, SetHandleHook, State as BuilderState,
};

pub struct EventProcessorGenerateSubscribeTopicParams<'a> {
    pub event_name: &'a str,
    pub event_handler: &'a Arc<dyn EventHandler>,
}

pub struct EventProcessorSubscriberConstructorParams<'a> {
    pub handler_name: &'a str,
    pub event_handler: &'a Arc<dyn EventHandler>,
}

pub struct OnEventHandleParams {
    pub handler: Arc<dyn EventHandler>,
    pub event_name: String,
    pub event: BoxedEvent,
    pub message: Message,
}

pub type EventProcessorGenerateSubscribeTopicFn = Arc<
    dyn Fn(EventProcessorGenerateSubscribeTopicParams<'_>) -> anyhow::Result<String> + Send + Sync,
>;

pub type EventProcessorSubscriberConstructorFn = Arc<
    dyn Fn(EventProcessorSubscriberConstructorParams<'_>) -> anyhow::Result<Arc<dyn Subscriber>>
        + Send
        + Sync,
>;

pub type OnEventHandleFn = Arc<dyn Fn(OnEventHandleParams) -> HandlerFuture + Send + Sync>;

#[derive(Builder, Clone)]
pub struct EventProcessorConfig {
    #[builder(setters(vis = "pub(crate)"))]
    generate_topic: Option<EventProcessorGenerateSubscribeTopicFn>,
    #[builder(setters(vis = "pub(crate)"))]
    create_subscriber: Option<EventProcessorSubscriberConstructorFn>,
    #[builder(setters(vis = "pub(crate)"))]
    handle_hook: Option<OnEventHandleFn>,
    /// 主题上出现非本处理器事件时是否直接确认（默认拒绝）
    #[builder(default)]
    ack_on_unknown_event: bool,
    marshaler: Option<Arc<dyn Marshaler>>,
    #[builder(default = tracing::info_span!("event_processor"))]
    logger: Span,
}

impl<S: BuilderState> EventProcessorConfigBuilder<S> {
    pub fn generate_subscribe_topic<F>(self, f: F) -> EventProcessorConfigBuilder<SetGenerateTopic<S>>
    where
        F: Fn(EventProcessorGenerateSubscribeTopicParams<'_>) -> anyhow::Result<String>
            + Send
            + Sync
            + 'static,
        <S as BuilderState>::GenerateTopic: IsUnset,
    {
        self.generate_topic(Arc::new(f))
    }

    pub fn subscriber_constructor<F>(self, f: F) -> EventProcessorConfigBuilder<SetCreateSubscriber<S>>
    where
        F: Fn(EventProcessorSubscriberConstructorParams<'_>) -> anyhow::Result<Arc<dyn Subscriber>>
            + Send
            + Sync
            + 'static,
        <S as BuilderState>::CreateSubscriber: IsUnset,
    {
        self.create_subscriber(Arc::new(f))
    }

    /// 设置分发钩子：钩子代替处理器被调用
    pub fn on_handle<F, Fut>(self, f: F) -> EventProcessorConfigBuilder<SetHandleHook<S>>
    where
        F: Fn(OnEventHandleParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        <S as BuilderState>::HandleHook: IsUnset,
    {
        self.handle_hook(Arc::new(
            move |params: OnEventHandleParams| -> HandlerFuture { Box::pin(f(params)) },
        ))
    }
}

impl EventProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        self.parts().map(|_| ())
    }

    fn parts(
        &self,
    ) -> Result<(
        Arc<dyn Marshaler>,
        EventProcessorGenerateSubscribeTopicFn,
        EventProcessorSubscriberConstructorFn,
    )> {
        let Some(marshaler) = self.marshaler.clone() else {
            return Err(CqrsError::MissingMarshaler);
        };

        match (&self.generate_topic, &self.create_subscriber) {
            (Some(generate_topic), Some(create_subscriber)) => {
                Ok((marshaler, generate_topic.clone(), create_subscriber.clone()))
            }
            (Some(_), None) => Err(CqrsError::MissingPairedField {
                missing: "SubscriberConstructor",
                provided: "GenerateSubscribeTopic",
            }),
            (None, Some(_)) => Err(CqrsError::MissingPairedField {
                missing: "GenerateSubscribeTopic",
                provided: "SubscriberConstructor",
            }),
            (None, None) => Err(CqrsError::MissingSubscription {
                topic: "GenerateSubscribeTopic",
                subscriber: "SubscriberConstructor",
            }),
        }
    }
}

pub struct EventProcessor {
    handlers: Vec<Arc<dyn EventHandler>>,
    attached: bool,
    marshaler: Arc<dyn Marshaler>,
    generate_topic: EventProcessorGenerateSubscribeTopicFn,
    create_subscriber: EventProcessorSubscriberConstructorFn,
    config: EventProcessorConfig,
}

impl EventProcessor {
    pub fn new(config: EventProcessorConfig) -> Result<Self> {
        let (marshaler, generate_topic, create_subscriber) = config.parts()?;

        Ok(Self {
            handlers: Vec::new(),
            attached: false,
            marshaler,
            generate_topic,
            create_subscriber,
            config,
        })
    }

    /// 批量注册处理器；任一名称冲突时整批都不会被注册
    pub fn add_handlers(&mut self, handlers: Vec<Arc<dyn EventHandler>>) -> Result<()> {
        if self.attached {
            return Err(CqrsError::AlreadyAttached);
        }
        if handlers.is_empty() {
            return Err(CqrsError::NoHandlers);
        }

        let mut names: HashSet<&str> = self.handlers.iter().map(|h| h.handler_name()).collect();
        for handler in &handlers {
            if !names.insert(handler.handler_name()) {
                return Err(CqrsError::DuplicateHandler(handler.handler_name().to_string()));
            }
        }

        for handler in &handlers {
            debug!(
                parent: &self.config.logger,
                handler = handler.handler_name(),
                event_name = %self.marshaler.name(handler.event_type()),
                "event handler added"
            );
        }
        self.handlers.extend(handlers);

        Ok(())
    }

    pub fn add_handlers_to_router(&mut self, router: &Router) -> Result<()> {
        if self.attached {
            return Err(CqrsError::AlreadyAttached);
        }

        let mut prepared = Vec::with_capacity(self.handlers.len());
        for handler in &self.handlers {
            let handler_name = handler.handler_name();
            let event_name = self.marshaler.name(handler.event_type());

            let topic = (self.generate_topic)(EventProcessorGenerateSubscribeTopicParams {
                event_name: &event_name,
                event_handler: handler,
            })
            .map_err(|err| CqrsError::GenerateTopic {
                name: handler_name.to_string(),
                reason: format!("{err:#}"),
            })?;

            let subscriber = (self.create_subscriber)(EventProcessorSubscriberConstructorParams {
                handler_name,
                event_handler: handler,
            })
            .map_err(|err| CqrsError::SubscriberConstructor {
                name: handler_name.to_string(),
                reason: format!("{err:#}"),
            })?;

            prepared.push((handler.clone(), event_name, topic, subscriber));
        }

        let existing = router.handler_names();
        if let Some((handler, ..)) = prepared
            .iter()
            .find(|(h, ..)| existing.iter().any(|name| name == h.handler_name()))
        {
            return Err(MessageError::DuplicateHandler {
                name: handler.handler_name().to_string(),
            }
            .into());
        }

        for (handler, event_name, topic, subscriber) in prepared {
            info!(
                parent: &self.config.logger,
                handler = handler.handler_name(),
                event_name = %event_name,
                topic = %topic,
                "adding event handler to router"
            );
            let name = handler.handler_name().to_string();
            let func = self.router_handler(handler, event_name);
            router.add_no_publisher_handler(name, topic, subscriber, func)?;
        }

        self.attached = true;
        Ok(())
    }

    fn router_handler(&self, handler: Arc<dyn EventHandler>, event_name: String) -> NoPublishHandlerFunc {
        let dispatcher = Arc::new(HandlerDispatcher {
            handler,
            event_name,
            marshaler: self.marshaler.clone(),
            on_handle: self.config.handle_hook.clone(),
            ack_on_unknown_event: self.config.ack_on_unknown_event,
            logger: self.config.logger.clone(),
        });

        Arc::new(move |msg: Message| -> HandlerFuture {
            let dispatcher = dispatcher.clone();
            Box::pin(async move { dispatcher.dispatch(msg).await })
        })
    }
}

struct HandlerDispatcher {
    handler: Arc<dyn EventHandler>,
    event_name: String,
    marshaler: Arc<dyn Marshaler>,
    on_handle: Option<OnEventHandleFn>,
    ack_on_unknown_event: bool,
    logger: Span,
}

impl HandlerDispatcher {
    async fn dispatch(&self, msg: Message) -> anyhow::Result<()> {
        match self.marshaler.name_from_message(&msg) {
            None => {
                return self.unexpected_event(
                    &msg,
                    CqrsError::MissingEventName {
                        message_uuid: msg.uuid().to_string(),
                    },
                );
            }
            Some(received) if received != self.event_name => {
                return self.unexpected_event(
                    &msg,
                    CqrsError::UnexpectedEvent {
                        expected: self.event_name.clone(),
                        received,
                    },
                );
            }
            Some(_) => {}
        }

        let payload = self.marshaler.unmarshal(&msg)?;
        let event = self.handler.decode(payload)?;

        debug!(
            parent: &self.logger,
            handler = self.handler.handler_name(),
            message_uuid = %msg.uuid(),
            "handling event"
        );

        match &self.on_handle {
            Some(on_handle) => {
                on_handle(OnEventHandleParams {
                    handler: self.handler.clone(),
                    event_name: self.event_name.clone(),
                    event,
                    message: msg,
                })
                .await
            }
            None => self.handler.handle(msg.context(), event).await,
        }
    }

    fn unexpected_event(&self, msg: &Message, err: CqrsError) -> anyhow::Result<()> {
        if !self.ack_on_unknown_event {
            return Err(err.into());
        }

        trace!(
            parent: &self.logger,
            handler = self.handler.handler_name(),
            message_uuid = %msg.uuid(),
            reason = %err,
            "event not handled by this handler, acking"
        );
        Ok(())
    }
}
