//! Kafka consumer for the reindex topics.

use futures::StreamExt;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::{BorrowedMessage, Message},
    Offset, TopicPartitionList,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

use crate::consumer::{deliver_with_retry, MessageHandler, RetryPolicy};
use crate::errors::ReindexError;
use crate::producer::DeadLetterSink;

/// Consumes one topic and dispatches its messages to a handler.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaConsumer {
    /// Create a consumer of `topic`.
    ///
    /// # Arguments
    ///
    /// * `brokers` - Kafka broker addresses (comma-separated)
    /// * `group_id` - Consumer group ID
    /// * `topic` - Topic to consume
    pub fn new(brokers: &str, group_id: &str, topic: impl Into<String>) -> Result<Self, ReindexError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| ReindexError::integration(format!("Failed to create Kafka consumer: {}", e)))?;

        let topic = topic.into();
        info!(brokers = %brokers, group_id = %group_id, topic = %topic, "Created Kafka consumer");

        Ok(Self { consumer, topic })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subscribe(&self) -> Result<(), ReindexError> {
        self.consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(|e| ReindexError::integration(e.to_string()))?;

        info!(topic = %self.topic, "Subscribed to Kafka topic");
        Ok(())
    }

    /// Consume until `shutdown` fires, processing up to `concurrency`
    /// messages at once.
    #[instrument(skip(self, handler, dead_letters, shutdown), fields(topic = %self.topic, handler = handler.name()))]
    pub async fn run(
        &self,
        handler: &dyn MessageHandler,
        dead_letters: &dyn DeadLetterSink,
        policy: RetryPolicy,
        concurrency: usize,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ReindexError> {
        let stop = async move {
            let _ = shutdown.recv().await;
            info!("Consumer received shutdown signal");
        };
        let policy = &policy;

        self.consumer
            .stream()
            .take_until(stop)
            .for_each_concurrent(concurrency.max(1), |message| async move {
                match message {
                    Ok(msg) => self.process_message(&msg, handler, dead_letters, policy).await,
                    Err(e) => error!(error = %e, "Kafka error"),
                }
            })
            .await;

        info!("Consumer stopped");
        Ok(())
    }

    async fn process_message(
        &self,
        msg: &BorrowedMessage<'_>,
        handler: &dyn MessageHandler,
        dead_letters: &dyn DeadLetterSink,
        policy: &RetryPolicy,
    ) {
        debug!(
            partition = msg.partition(),
            offset = msg.offset(),
            "Processing message"
        );

        match msg.payload() {
            Some(payload) => {
                if let Err(e) = deliver_with_retry(handler, payload, policy).await {
                    error!(offset = msg.offset(), error = %e, "Giving up on message");
                    handler.on_retries_exhausted(payload, &e).await;

                    if let Err(dlt_error) = dead_letters
                        .send_dead_letter(msg.topic(), msg.key(), payload, &e.to_string())
                        .await
                    {
                        error!(error = %dlt_error, "Failed to dead-letter message");
                    }
                }
            }
            None => debug!("Received message with empty payload"),
        }

        if let Err(e) = self.commit(msg) {
            error!(error = %e, "Failed to commit offset");
        }
    }

    fn commit(&self, msg: &BorrowedMessage<'_>) -> Result<(), ReindexError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(msg.topic(), msg.partition(), Offset::Offset(msg.offset() + 1))
            .map_err(|e| ReindexError::integration(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| ReindexError::integration(e.to_string()))
    }
}
