//! Runs the reindex consumers until shutdown.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::consumer::{KafkaConsumer, MessageHandler, RetryPolicy};
use crate::errors::ReindexError;
use crate::producer::DeadLetterSink;

/// One consumer paired with the handler of its topic.
pub struct Listener {
    pub consumer: KafkaConsumer,
    pub handler: Arc<dyn MessageHandler>,
}

/// Drives the range-index and records listeners side by side.
pub struct PipelineRunner {
    listeners: Vec<Arc<Listener>>,
    dead_letters: Arc<dyn DeadLetterSink>,
    policy: RetryPolicy,
    concurrency: usize,
    shutdown_tx: broadcast::Sender<()>,
}

impl PipelineRunner {
    pub fn new(
        listeners: Vec<Listener>,
        dead_letters: Arc<dyn DeadLetterSink>,
        policy: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            listeners: listeners.into_iter().map(Arc::new).collect(),
            dead_letters,
            policy,
            concurrency,
            shutdown_tx,
        }
    }

    /// A sender that stops every listener when signalled.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Subscribe every listener and consume until Ctrl-C or a shutdown signal.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ReindexError> {
        info!(listeners = self.listeners.len(), "Starting reindex consumers");

        let mut handles = Vec::with_capacity(self.listeners.len());
        for listener in &self.listeners {
            listener.consumer.subscribe()?;

            let listener = listener.clone();
            let dead_letters = self.dead_letters.clone();
            let policy = self.policy;
            let concurrency = self.concurrency;
            let shutdown_rx = self.shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                let result = listener
                    .consumer
                    .run(
                        listener.handler.as_ref(),
                        dead_letters.as_ref(),
                        policy,
                        concurrency,
                        shutdown_rx,
                    )
                    .await;
                if let Err(e) = &result {
                    error!(topic = %listener.consumer.topic(), error = %e, "Consumer error");
                }
                result
            }));
        }

        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, shutting down");
                let _ = shutdown_tx.send(());
            }
        });

        for handle in handles {
            handle
                .await
                .map_err(|e| ReindexError::channel(format!("Consumer task failed: {}", e)))??;
        }

        info!("Reindex consumers stopped");
        Ok(())
    }
}
