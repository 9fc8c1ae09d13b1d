//! 处理器组示例：同一主题上的两种事件由同组内不同处理器处理
//!
//! 运行：`RUST_LOG=debug cargo run -p ddd-cqrs --example event_group_processor`
//!
use anyhow::Result;
use ddd_cqrs::{
    Event, EventBus, EventBusConfig, EventGroupProcessor, EventGroupProcessorConfig,
    GroupEventHandler, JsonMarshaler, Marshaler, new_group_event_handler,
};
use ddd_message::{InMemoryPubSub, MessageContext, Router, Subscriber};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Serialize, Deserialize, Event)]
#[event(name = "booking.room_booked")]
struct RoomBooked {
    room_id: String,
    guest_name: String,
    nights: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Event)]
#[event(name = "booking.beer_ordered")]
struct BeerOrdered {
    room_id: String,
    count: u32,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let pubsub = InMemoryPubSub::new();
    let marshaler: Arc<dyn Marshaler> = Arc::new(JsonMarshaler::default());

    let config = EventGroupProcessorConfig::builder()
        .generate_handler_group_subscribe_topic(|params| {
            Ok(format!("events.{}", params.event_group_name))
        })
        .group_subscriber_constructor({
            let pubsub = pubsub.clone();
            move |_params| Ok(Arc::new(pubsub.clone()) as Arc<dyn Subscriber>)
        })
        .on_group_handle(|params| async move {
            tracing::info!(group = %params.group_name, event = %params.event_name, "dispatching");
            params
                .handler
                .handle(params.message.context(), params.event)
                .await
        })
        .marshaler(marshaler.clone())
        .build();

    let on_room_booked: Arc<dyn GroupEventHandler> =
        Arc::new(new_group_event_handler(|_ctx, e: RoomBooked| async move {
            println!(
                "room {} booked for {} ({} nights)",
                e.room_id, e.guest_name, e.nights
            );
            Ok(())
        }));
    let on_beer_ordered: Arc<dyn GroupEventHandler> =
        Arc::new(new_group_event_handler(|_ctx, e: BeerOrdered| async move {
            anyhow::ensure!(e.count > 0, "empty beer order for room {}", e.room_id);
            println!("{} beers ordered for room {}", e.count, e.room_id);
            Ok(())
        }));

    let router = Arc::new(Router::default());
    let mut processor = EventGroupProcessor::new(config)?;
    processor.add_handlers_group("booking", vec![on_room_booked, on_beer_ordered])?;
    processor.add_handlers_to_router(&router)?;

    let runner = {
        let router = router.clone();
        tokio::spawn(async move { router.run().await })
    };
    anyhow::ensure!(router.running().await, "router failed to start");

    let bus = EventBus::new(
        Arc::new(pubsub.clone()),
        EventBusConfig::builder()
            .generate_publish_topic(|_params| Ok("events.booking".to_string()))
            .marshaler(marshaler)
            .build(),
    )?;

    let ctx = MessageContext::default();
    bus.publish(
        &ctx,
        &RoomBooked {
            room_id: "101".into(),
            guest_name: "Ada".into(),
            nights: 3,
        },
    )
    .await?;
    bus.publish(
        &ctx,
        &BeerOrdered {
            room_id: "101".into(),
            count: 2,
        },
    )
    .await?;

    tokio::time::sleep(Duration::from_millis(200)).await;
    router.close();
    runner.await??;

    Ok(())
}
