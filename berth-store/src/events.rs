use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

/// Publishes booking domain events as JSON, keyed by booking reference so
/// every event for one booking lands on the same partition.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish<T: Serialize + Sync>(&self, topic: &str, reference: &str, event: &T) -> Result<(), KafkaError> {
        let payload = encode(topic, event)?;
        let record = FutureRecord::to(topic).key(reference).payload(&payload);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(Duration::from_secs(0)))
            .await
            .map(|delivery| (delivery.partition, delivery.offset))
            .map_err(|(e, _)| {
                error!("Event for {} on {} was not delivered: {}", reference, topic, e);
                e
            })?;

        debug!("{} event for {} at partition {} offset {}", topic, reference, partition, offset);
        Ok(())
    }
}

fn encode<T: Serialize>(topic: &str, event: &T) -> Result<String, KafkaError> {
    serde_json::to_string(event).map_err(|e| {
        error!("Could not serialize {} event: {}", topic, e);
        KafkaError::MessageProduction(RDKafkaErrorCode::InvalidMessage)
    })
}
