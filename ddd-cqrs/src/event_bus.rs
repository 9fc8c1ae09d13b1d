//! 事件总线（EventBus）
//!
//! 发布侧入口：将强类型事件编码为消息，按事件生成主题后交给 `Publisher`。
//! 编码使用与处理器相同的 `Marshaler`，保证两端事件名一致。
//!
use crate::error::{CqrsError, CqrsResult as Result};
use crate::event::Event;
use crate::marshaler::{Marshaler, marshal_event};
use bon::Builder;
use ddd_message::{Message, MessageContext, Publisher};
use std::any::Any;
use std::sync::Arc;
use tracing::{Span, debug};

use self::event_bus_config_builder::{IsUnset, SetOnPublishHook, SetPublishTopic, State as BuilderState};

pub struct GenerateEventPublishTopicParams<'a> {
    pub event_name: &'a str,
    pub event: &'a (dyn Any + Send + Sync),
}

pub struct OnEventSendParams<'a> {
    pub event_name: &'a str,
    pub event: &'a (dyn Any + Send + Sync),
    /// 可在发布前修改，例如补充元数据
    pub message: &'a mut Message,
}

pub type GenerateEventPublishTopicFn =
    Arc<dyn Fn(GenerateEventPublishTopicParams<'_>) -> anyhow::Result<String> + Send + Sync>;

pub type OnEventSendFn = Arc<dyn Fn(OnEventSendParams<'_>) -> anyhow::Result<()> + Send + Sync>;

#[derive(Builder, Clone)]
pub struct EventBusConfig {
    #[builder(setters(vis = "pub(crate)"))]
    publish_topic: Option<GenerateEventPublishTopicFn>,
    #[builder(setters(vis = "pub(crate)"))]
    on_publish_hook: Option<OnEventSendFn>,
    marshaler: Option<Arc<dyn Marshaler>>,
    #[builder(default = tracing::info_span!("event_bus"))]
    logger: Span,
}

impl<S: BuilderState> EventBusConfigBuilder<S> {
    pub fn generate_publish_topic<F>(self, f: F) -> EventBusConfigBuilder<SetPublishTopic<S>>
    where
        F: Fn(GenerateEventPublishTopicParams<'_>) -> anyhow::Result<String> + Send + Sync + 'static,
        <S as BuilderState>::PublishTopic: IsUnset,
    {
        self.publish_topic(Arc::new(f))
    }

    pub fn on_publish<F>(self, f: F) -> EventBusConfigBuilder<SetOnPublishHook<S>>
    where
        F: Fn(OnEventSendParams<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
        <S as BuilderState>::OnPublishHook: IsUnset,
    {
        self.on_publish_hook(Arc::new(f))
    }
}

impl EventBusConfig {
    pub fn validate(&self) -> Result<()> {
        self.parts().map(|_| ())
    }

    fn parts(&self) -> Result<(Arc<dyn Marshaler>, GenerateEventPublishTopicFn)> {
        let Some(marshaler) = self.marshaler.clone() else {
            return Err(CqrsError::MissingMarshaler);
        };
        let Some(publish_topic) = self.publish_topic.clone() else {
            return Err(CqrsError::MissingGeneratePublishTopic);
        };
        Ok((marshaler, publish_topic))
    }
}

#[derive(Clone)]
pub struct EventBus {
    publisher: Arc<dyn Publisher>,
    marshaler: Arc<dyn Marshaler>,
    publish_topic: GenerateEventPublishTopicFn,
    on_publish: Option<OnEventSendFn>,
    logger: Span,
}

impl EventBus {
    pub fn new(publisher: Arc<dyn Publisher>, config: EventBusConfig) -> Result<Self> {
        let (marshaler, publish_topic) = config.parts()?;

        Ok(Self {
            publisher,
            marshaler,
            publish_topic,
            on_publish: config.on_publish_hook,
            logger: config.logger,
        })
    }

    /// 发布事件；消息上下文随消息一同传递
    pub async fn publish<E: Event>(&self, ctx: &MessageContext, event: &E) -> Result<()> {
        let mut msg = marshal_event(self.marshaler.as_ref(), event)?;
        let event_name = self.marshaler.name_from_message(&msg).ok_or_else(|| {
            CqrsError::MissingEventName {
                message_uuid: msg.uuid().to_string(),
            }
        })?;

        let topic = (self.publish_topic)(GenerateEventPublishTopicParams {
            event_name: &event_name,
            event,
        })
        .map_err(|err| CqrsError::GenerateTopic {
            name: event_name.clone(),
            reason: format!("{err:#}"),
        })?;

        msg.set_context(ctx.clone());

        if let Some(on_publish) = &self.on_publish {
            on_publish(OnEventSendParams {
                event_name: &event_name,
                event,
                message: &mut msg,
            })
            .map_err(|err| CqrsError::Publish {
                topic: topic.clone(),
                reason: format!("{err:#}"),
            })?;
        }

        debug!(
            parent: &self.logger,
            event_name = %event_name,
            topic = %topic,
            message_uuid = %msg.uuid(),
            "publishing event"
        );

        self.publisher.publish(&topic, vec![msg]).await?;
        Ok(())
    }
}
