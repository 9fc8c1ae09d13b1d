mod common;

use common::{WAIT, start, stop};
use ddd_cqrs::{
    Event, EventBus, EventBusConfig, EventGroupProcessor, EventGroupProcessorConfig,
    GroupEventHandler, JsonMarshaler, Marshaler, new_group_event_handler,
};
use ddd_message::{InMemoryPubSub, MessageContext, Router, Subscriber};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
#[event(name = "accounts.opened")]
struct AccountOpened {
    account_id: String,
    owner: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
#[event(name = "accounts.closed")]
struct AccountClosed {
    account_id: String,
}

#[tokio::test(flavor = "multi_thread")]
async fn published_events_reach_group_handlers() {
    let pubsub = InMemoryPubSub::new();
    let marshaler: Arc<dyn Marshaler> = Arc::new(JsonMarshaler::default());

    let bus = EventBus::new(
        Arc::new(pubsub.clone()),
        EventBusConfig::builder()
            .generate_publish_topic(|_params| Ok("accounts".to_string()))
            .marshaler(marshaler.clone())
            .build(),
    )
    .unwrap();

    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let on_opened: Arc<dyn GroupEventHandler> = {
        let log = log.clone();
        Arc::new(new_group_event_handler(move |_ctx, e: AccountOpened| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("opened:{}:{}", e.account_id, e.owner));
                Ok(())
            }
        }))
    };
    let on_closed: Arc<dyn GroupEventHandler> = {
        let log = log.clone();
        Arc::new(new_group_event_handler(move |_ctx, e: AccountClosed| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("closed:{}", e.account_id));
                Ok(())
            }
        }))
    };

    let config = EventGroupProcessorConfig::builder()
        .generate_handler_group_subscribe_topic(|_params| Ok("accounts".to_string()))
        .group_subscriber_constructor({
            let pubsub = pubsub.clone();
            move |_params| Ok(Arc::new(pubsub.clone()) as Arc<dyn Subscriber>)
        })
        .marshaler(marshaler)
        .build();

    let router = Arc::new(Router::default());
    let mut processor = EventGroupProcessor::new(config).unwrap();
    processor
        .add_handlers_group("accounts", vec![on_opened, on_closed])
        .unwrap();
    processor.add_handlers_to_router(&router).unwrap();

    let runner = start(router.clone()).await;
    assert_eq!(pubsub.subscribers("accounts"), 1);

    let ctx = MessageContext::default();
    bus.publish(
        &ctx,
        &AccountOpened {
            account_id: "a-1".into(),
            owner: "carol".into(),
        },
    )
    .await
    .unwrap();
    bus.publish(
        &ctx,
        &AccountClosed {
            account_id: "a-1".into(),
        },
    )
    .await
    .unwrap();

    tokio::time::timeout(WAIT, async {
        while log.lock().unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("events were not handled");
    stop(&router, runner).await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["opened:a-1:carol", "closed:a-1"]
    );
}
