//! Outbound message-bus seams.

mod kafka_producer;

use async_trait::async_trait;

use search_reindex_shared::ReindexRangeIndexEvent;

use crate::errors::ReindexError;

pub use kafka_producer::KafkaProducer;

/// Suffix of the dead-letter topic of a consumed topic.
pub const DEAD_LETTER_SUFFIX: &str = ".DLT";

/// Dead-letter topic of `topic`.
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{}{}", topic, DEAD_LETTER_SUFFIX)
}

/// Publishes upload-range events to the range-index topic.
#[async_trait]
pub trait RangeEventPublisher: Send + Sync {
    async fn publish_range_events(
        &self,
        events: &[ReindexRangeIndexEvent],
    ) -> Result<(), ReindexError>;
}

/// Receives messages a consumer gave up on.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send_dead_letter(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
        reason: &str,
    ) -> Result<(), ReindexError>;
}
