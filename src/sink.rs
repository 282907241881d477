//! Event sinks
//!
//! [`ErrorSink`] is the pluggable destination for captured events. The host
//! picks one implementation when it builds the orchestrator.
//!
//! [`QueueSink`] is the default: it forwards events to a managed queue, one
//! message per event, grouped by application name. Batches are split into
//! chunks that are sent concurrently. Per-message rejections are logged
//! without failing the batch; a send that fails outright is returned so the
//! orchestrator can count it. Nothing is retried here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::config::SinkConfig;
use crate::error::CaptureError;
use crate::event::ErrorEvent;
use crate::queue::{BatchEntry, MessageAttribute, OutboundMessage, QueueClient};
use crate::utils::{format_timestamp, generate_id};

/// Destination for captured error events
///
/// Returned errors are logged and counted as failed by the orchestrator.
/// `health_check` must never fail, only report `false`.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn publish(&self, event: &ErrorEvent) -> Result<(), CaptureError>;

    async fn publish_batch(&self, events: &[ErrorEvent]) -> Result<(), CaptureError>;

    async fn health_check(&self) -> bool;
}

/// Sink that forwards events to a managed queue
pub struct QueueSink {
    client: Arc<dyn QueueClient>,
    config: SinkConfig,
    debug: bool,
}

impl QueueSink {
    pub fn new(client: Arc<dyn QueueClient>, config: SinkConfig) -> Self {
        Self {
            client,
            config,
            debug: false,
        }
    }

    /// Log every serialized payload before it is sent
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.queue_url.is_some()
    }

    fn to_message(&self, event: &ErrorEvent) -> Result<OutboundMessage, CaptureError> {
        let body = serde_json::to_string(event)?;

        if self.debug {
            tracing::debug!(event_id = event.id(), payload = %body, "serialized error event");
        }

        Ok(OutboundMessage {
            body,
            group_id: event.application_name().to_string(),
            deduplication_id: generate_id(),
            attributes: message_attributes(event),
        })
    }

    /// Send one chunk; only a failed request is an error, rejected entries are logged
    async fn send_chunk(&self, queue_url: &str, chunk_index: usize, chunk: &[ErrorEvent]) -> Result<(), CaptureError> {
        let entries: Vec<BatchEntry> = chunk
            .iter()
            .enumerate()
            .filter_map(|(index, event)| match self.to_message(event) {
                Ok(message) => Some(BatchEntry {
                    id: index.to_string(),
                    message,
                }),
                Err(e) => {
                    tracing::error!(event_id = event.id(), error = %e, "failed to serialize error event");
                    None
                }
            })
            .collect();

        if entries.is_empty() {
            return Ok(());
        }

        let outcome = self.client.send_message_batch(queue_url, entries).await?;
        for failure in &outcome.failed {
            tracing::warn!(
                chunk = chunk_index,
                entry_id = %failure.id,
                code = %failure.code,
                error_message = failure.message.as_deref().unwrap_or(""),
                sender_fault = failure.sender_fault,
                "queue rejected error event"
            );
        }
        tracing::debug!(
            chunk = chunk_index,
            succeeded = outcome.successful.len(),
            failed = outcome.failed.len(),
            "error event batch sent"
        );
        Ok(())
    }
}

#[async_trait]
impl ErrorSink for QueueSink {
    async fn publish(&self, event: &ErrorEvent) -> Result<(), CaptureError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let queue_url = self.config.get_queue_url()?;

        let message = self.to_message(event)?;
        let message_id = self.client.send_message(queue_url, message).await?;
        tracing::debug!(event_id = event.id(), message_id = %message_id, "error event sent");
        Ok(())
    }

    async fn publish_batch(&self, events: &[ErrorEvent]) -> Result<(), CaptureError> {
        if !self.is_enabled() || events.is_empty() {
            return Ok(());
        }
        let queue_url = self.config.get_queue_url()?;

        let sends = events
            .chunks(self.config.effective_batch_size())
            .enumerate()
            .map(|(index, chunk)| self.send_chunk(queue_url, index, chunk));
        let results = join_all(sends).await;

        let total = results.len();
        let mut errors = results.into_iter().filter_map(Result::err);
        let Some(first) = errors.next() else {
            return Ok(());
        };
        Err(CaptureError::BatchFailed {
            failed: 1 + errors.count(),
            total,
            reason: first.to_string(),
        })
    }

    async fn health_check(&self) -> bool {
        let Some(queue_url) = self.config.queue_url.as_deref() else {
            return false;
        };

        match self.client.queue_attributes(queue_url).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "error event queue health check failed");
                false
            }
        }
    }
}

fn message_attributes(event: &ErrorEvent) -> HashMap<String, MessageAttribute> {
    HashMap::from([
        (
            "applicationName".to_string(),
            MessageAttribute::string(event.application_name()),
        ),
        (
            "statusCode".to_string(),
            MessageAttribute::number(event.status_code()),
        ),
        ("method".to_string(), MessageAttribute::string(event.method())),
        (
            "timestamp".to_string(),
            MessageAttribute::string(format_timestamp(event.timestamp())),
        ),
    ])
}
