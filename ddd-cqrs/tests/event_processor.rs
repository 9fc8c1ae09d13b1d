mod common;

use common::{StaticSubscriber, outcome, start, stop};
use ddd_cqrs::marshaler::marshal_event;
use ddd_cqrs::{
    Event, EventHandler, EventProcessor, EventProcessorConfig, JsonMarshaler, Marshaler,
    new_event_handler,
};
use ddd_message::{AckState, Message, Router, Subscriber};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
struct InvoiceIssued {
    invoice_id: String,
    total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
struct InvoicePaid {
    invoice_id: String,
}

fn marshaler() -> Arc<dyn Marshaler> {
    Arc::new(JsonMarshaler::default())
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_payload_is_rejected_without_invoking_handler() {
    let mut malformed = Message::with_random_uuid(b"{not json".to_vec());
    malformed.metadata_mut().set("name", "InvoiceIssued");
    let valid = marshal_event(
        marshaler().as_ref(),
        &InvoiceIssued {
            invoice_id: "i-1".into(),
            total: 10,
        },
    )
    .unwrap();
    let messages = [malformed, valid];

    let calls = Arc::new(AtomicUsize::new(0));
    let handler: Arc<dyn EventHandler> = {
        let calls = calls.clone();
        Arc::new(new_event_handler("on-invoice-issued", move |_ctx, e: InvoiceIssued| {
            let calls = calls.clone();
            async move {
                assert_eq!(e.invoice_id, "i-1");
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    };

    let subscriber = StaticSubscriber::shared(&messages);
    let config = EventProcessorConfig::builder()
        .generate_subscribe_topic(|params| Ok(params.event_name.to_string()))
        .subscriber_constructor(move |_params| Ok(subscriber.clone()))
        .marshaler(marshaler())
        .build();

    let router = Arc::new(Router::default());
    let mut processor = EventProcessor::new(config).unwrap();
    processor.add_handlers(vec![handler]).unwrap();
    processor.add_handlers_to_router(&router).unwrap();

    let runner = start(router.clone()).await;
    assert_eq!(outcome(&messages[0]).await, AckState::Nacked);
    assert_eq!(outcome(&messages[1]).await, AckState::Acked);
    stop(&router, runner).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn each_handler_gets_its_own_topic_and_subscriber() {
    let m = marshaler();
    let issued = marshal_event(
        m.as_ref(),
        &InvoiceIssued {
            invoice_id: "i-2".into(),
            total: 5,
        },
    )
    .unwrap();
    let paid = marshal_event(
        m.as_ref(),
        &InvoicePaid {
            invoice_id: "i-2".into(),
        },
    )
    .unwrap();

    // 按事件名分配订阅者
    let subscribers: HashMap<String, Arc<dyn Subscriber>> = HashMap::from([
        ("InvoiceIssued".to_string(), StaticSubscriber::shared(&[issued.clone()])),
        ("InvoicePaid".to_string(), StaticSubscriber::shared(&[paid.clone()])),
    ]);
    let topics = Arc::new(Mutex::new(Vec::new()));

    let config = EventProcessorConfig::builder()
        .generate_subscribe_topic({
            let topics = topics.clone();
            move |params| {
                let topic = format!("invoices.{}", params.event_name);
                topics.lock().unwrap().push(topic.clone());
                Ok(topic)
            }
        })
        .subscriber_constructor(move |params| {
            let event_name = params.event_handler.event_type().name();
            subscribers
                .get(event_name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no subscriber for {}", params.handler_name))
        })
        .marshaler(m.clone())
        .build();

    let handled = Arc::new(Mutex::new(Vec::<String>::new()));
    let on_issued: Arc<dyn EventHandler> = {
        let handled = handled.clone();
        Arc::new(new_event_handler("on-issued", move |_ctx, e: InvoiceIssued| {
            let handled = handled.clone();
            async move {
                handled.lock().unwrap().push(format!("issued:{}", e.invoice_id));
                Ok(())
            }
        }))
    };
    let on_paid: Arc<dyn EventHandler> = {
        let handled = handled.clone();
        Arc::new(new_event_handler("on-paid", move |_ctx, e: InvoicePaid| {
            let handled = handled.clone();
            async move {
                handled.lock().unwrap().push(format!("paid:{}", e.invoice_id));
                Ok(())
            }
        }))
    };

    let router = Arc::new(Router::default());
    let mut processor = EventProcessor::new(config).unwrap();
    processor.add_handlers(vec![on_issued, on_paid]).unwrap();
    processor.add_handlers_to_router(&router).unwrap();
    assert_eq!(router.handler_names(), vec!["on-issued", "on-paid"]);
    assert_eq!(
        *topics.lock().unwrap(),
        vec!["invoices.InvoiceIssued", "invoices.InvoicePaid"]
    );

    let runner = start(router.clone()).await;
    assert_eq!(outcome(&issued).await, AckState::Acked);
    assert_eq!(outcome(&paid).await, AckState::Acked);
    stop(&router, runner).await;

    let mut handled = handled.lock().unwrap().clone();
    handled.sort();
    assert_eq!(handled, vec!["issued:i-2", "paid:i-2"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn on_handle_hook_can_reject_or_call_through_to_handler() {
    let m = marshaler();
    let messages = [
        marshal_event(
            m.as_ref(),
            &InvoicePaid {
                invoice_id: "rejected".into(),
            },
        )
        .unwrap(),
        marshal_event(
            m.as_ref(),
            &InvoicePaid {
                invoice_id: "i-3".into(),
            },
        )
        .unwrap(),
    ];

    let handler_calls = Arc::new(AtomicUsize::new(0));
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let handler: Arc<dyn EventHandler> = {
        let calls = handler_calls.clone();
        Arc::new(new_event_handler("on-paid", move |_ctx, e: InvoicePaid| {
            let calls = calls.clone();
            async move {
                assert_eq!(e.invoice_id, "i-3");
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    };

    let subscriber = StaticSubscriber::shared(&messages);
    let config = EventProcessorConfig::builder()
        .generate_subscribe_topic(|params| Ok(params.event_name.to_string()))
        .subscriber_constructor(move |_params| Ok(subscriber.clone()))
        .marshaler(m.clone())
        .on_handle({
            let hook_calls = hook_calls.clone();
            move |params| {
                let first = hook_calls.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    assert_eq!(params.event_name, "InvoicePaid");
                    assert_eq!(params.handler.handler_name(), "on-paid");
                    if first {
                        anyhow::bail!("rejected by hook");
                    }
                    params
                        .handler
                        .handle(params.message.context(), params.event)
                        .await
                }
            }
        })
        .build();

    let router = Arc::new(Router::default());
    let mut processor = EventProcessor::new(config).unwrap();
    processor.add_handlers(vec![handler]).unwrap();
    processor.add_handlers_to_router(&router).unwrap();

    let runner = start(router.clone()).await;
    assert_eq!(outcome(&messages[0]).await, AckState::Nacked);
    assert_eq!(outcome(&messages[1]).await, AckState::Acked);
    stop(&router, runner).await;

    assert_eq!(hook_calls.load(Ordering::SeqCst), 2);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn subscriber_constructor_failure_is_reported_with_handler_name() {
    let config = EventProcessorConfig::builder()
        .generate_subscribe_topic(|params| Ok(params.event_name.to_string()))
        .subscriber_constructor(|_params| anyhow::bail!("broker unavailable"))
        .marshaler(marshaler())
        .build();

    let router = Router::default();
    let mut processor = EventProcessor::new(config).unwrap();
    let handler: Arc<dyn EventHandler> =
        Arc::new(new_event_handler("on-paid", |_ctx, _e: InvoicePaid| async { Ok(()) }));
    processor.add_handlers(vec![handler]).unwrap();

    let err = processor.add_handlers_to_router(&router).unwrap_err();
    assert_eq!(
        err.to_string(),
        "cannot create subscriber for 'on-paid': broker unavailable"
    );
    assert!(router.handler_names().is_empty());
}
