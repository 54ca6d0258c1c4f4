use async_trait::async_trait;
use rail_core::events::BookingEventSink;
use rail_shared::models::BookingEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl BookingEventSink for EventProducer {
    async fn publish(&self, event: BookingEvent) {
        let payload = match event.payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping {} event for booking {}: {}", event.kind.topic(), event.booking_id, e);
                return;
            }
        };

        // Delivery failures are already logged and never fail the booking operation.
        let _ = EventProducer::publish(self, event.kind.topic(), &event.key(), &payload).await;
    }
}
