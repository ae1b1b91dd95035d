//! Kafka producer for range events and dead letters.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{debug, info, instrument, warn};

use search_reindex_shared::ReindexRangeIndexEvent;

use crate::errors::ReindexError;
use crate::integration::source_of_record::TENANT_HEADER;
use crate::producer::{dead_letter_topic, DeadLetterSink, RangeEventPublisher};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Header naming why a message was dead-lettered.
const ERROR_HEADER: &str = "x-exception-message";

/// Kafka producer with zstd compression.
pub struct KafkaProducer {
    producer: FutureProducer,
    range_index_topic: String,
}

impl KafkaProducer {
    /// Create a producer publishing range events to `range_index_topic`.
    pub fn new(brokers: &str, range_index_topic: impl Into<String>) -> Result<Self, ReindexError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", "search-reindex")
            .set("compression.type", "zstd")
            .set("message.timeout.ms", "5000")
            .set("queue.buffering.max.messages", "100000")
            .create()
            .map_err(|e| ReindexError::integration(format!("Failed to create Kafka producer: {}", e)))?;

        let range_index_topic = range_index_topic.into();
        info!(brokers = %brokers, topic = %range_index_topic, "Created Kafka producer");

        Ok(Self {
            producer,
            range_index_topic,
        })
    }

    async fn send(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
        headers: OwnedHeaders,
    ) -> Result<(), ReindexError> {
        let mut record = FutureRecord::to(topic).payload(payload).headers(headers);
        if let Some(key) = key {
            record = record.key(key);
        }

        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|(e, _)| ReindexError::integration(format!("Failed to send to {}: {}", topic, e)))
    }
}

#[async_trait]
impl RangeEventPublisher for KafkaProducer {
    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn publish_range_events(
        &self,
        events: &[ReindexRangeIndexEvent],
    ) -> Result<(), ReindexError> {
        for event in events {
            let payload = serde_json::to_vec(event)
                .map_err(|e| ReindexError::parse(format!("Failed to encode range event: {}", e)))?;
            let key = event.id.to_string();
            let headers = OwnedHeaders::new().insert(Header {
                key: TENANT_HEADER,
                value: Some(event.tenant.as_str()),
            });

            self.send(&self.range_index_topic, Some(key.as_bytes()), &payload, headers)
                .await?;
        }

        debug!(topic = %self.range_index_topic, "Published range events");
        Ok(())
    }
}

#[async_trait]
impl DeadLetterSink for KafkaProducer {
    async fn send_dead_letter(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
        reason: &str,
    ) -> Result<(), ReindexError> {
        let dlt = dead_letter_topic(topic);
        let headers = OwnedHeaders::new().insert(Header {
            key: ERROR_HEADER,
            value: Some(reason),
        });

        self.send(&dlt, key, payload, headers).await?;
        warn!(topic = %dlt, reason = %reason, "Sent message to dead-letter topic");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_topic() {
        assert_eq!(
            dead_letter_topic("search.reindex.range-index"),
            "search.reindex.range-index.DLT"
        );
    }
}
