//! Queue transport
//!
//! [`QueueClient`] is the seam between the sink and the managed queue service.
//! [`HttpQueueClient`] speaks the queue's JSON protocol over HTTP with a
//! shared `reqwest` client, a request timeout and optional bearer
//! authentication for a signing gateway in front of the queue.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::SinkConfig;
use crate::error::CaptureError;

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const TARGET_PREFIX: &str = "AmazonSQS.";

/// Typed attribute attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttribute {
    #[serde(rename = "DataType")]
    pub data_type: String,
    #[serde(rename = "StringValue")]
    pub string_value: String,
}

impl MessageAttribute {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_string(),
            string_value: value.into(),
        }
    }

    pub fn number(value: impl ToString) -> Self {
        Self {
            data_type: "Number".to_string(),
            string_value: value.to_string(),
        }
    }
}

/// One message ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: String,
    /// Ordering group on FIFO queues
    pub group_id: String,
    /// Collapses duplicate sends on FIFO queues
    pub deduplication_id: String,
    pub attributes: HashMap<String, MessageAttribute>,
}

/// Message inside a batch send, addressed by an id unique within the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub id: String,
    pub message: OutboundMessage,
}

/// Per-message rejection inside an otherwise successful batch call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FailedEntry {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "SenderFault", default)]
    pub sender_fault: bool,
}

/// Outcome of a batch send: accepted entry ids and rejected entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<FailedEntry>,
}

/// Operations the sink needs from a queue service
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Send one message, returning the backend's message id
    async fn send_message(
        &self,
        queue_url: &str,
        message: OutboundMessage,
    ) -> Result<String, CaptureError>;

    /// Send up to one batch of messages in a single call
    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: Vec<BatchEntry>,
    ) -> Result<BatchOutcome, CaptureError>;

    /// Cheap metadata query used for health checks
    async fn queue_attributes(&self, queue_url: &str) -> Result<HashMap<String, String>, CaptureError>;
}

/// HTTP implementation of [`QueueClient`]
#[derive(Clone)]
pub struct HttpQueueClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl fmt::Debug for HttpQueueClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpQueueClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl HttpQueueClient {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Build a client from sink settings
    pub fn from_config(config: &SinkConfig) -> Result<Self, CaptureError> {
        let endpoint = config.resolved_endpoint().ok_or(CaptureError::MissingConfig)?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self::new(client, endpoint, config.api_key.clone()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<Req, Resp>(&self, action: &str, payload: &Req) -> Result<Resp, CaptureError>
    where
        Req: Serialize + ?Sized,
        Resp: for<'de> Deserialize<'de>,
    {
        let body = serde_json::to_vec(payload)?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", format!("{TARGET_PREFIX}{action}"))
            .body(body);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            // Backend error documents carry a type and message; fall back to the status.
            if let Ok(error) = serde_json::from_slice::<BackendError>(&bytes) {
                if let Some(code) = error.code {
                    return Err(CaptureError::Backend {
                        code,
                        message: error.message.unwrap_or_default(),
                    });
                }
            }
            return Err(CaptureError::SendFailed(status));
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl QueueClient for HttpQueueClient {
    async fn send_message(
        &self,
        queue_url: &str,
        message: OutboundMessage,
    ) -> Result<String, CaptureError> {
        let request = SendMessageRequest::new(queue_url, message);
        let response: SendMessageResponse = self.call("SendMessage", &request).await?;
        Ok(response.message_id.unwrap_or_default())
    }

    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: Vec<BatchEntry>,
    ) -> Result<BatchOutcome, CaptureError> {
        let request = SendMessageBatchRequest {
            queue_url,
            entries: entries.into_iter().map(BatchRequestEntry::from).collect(),
        };
        let response: SendMessageBatchResponse = self.call("SendMessageBatch", &request).await?;

        Ok(BatchOutcome {
            successful: response.successful.into_iter().map(|s| s.id).collect(),
            failed: response.failed,
        })
    }

    async fn queue_attributes(&self, queue_url: &str) -> Result<HashMap<String, String>, CaptureError> {
        let request = GetQueueAttributesRequest {
            queue_url,
            attribute_names: &["QueueArn"],
        };
        let response: GetQueueAttributesResponse = self.call("GetQueueAttributes", &request).await?;
        Ok(response.attributes)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageRequest<'a> {
    queue_url: &'a str,
    message_body: String,
    message_group_id: String,
    message_deduplication_id: String,
    message_attributes: HashMap<String, MessageAttribute>,
}

impl<'a> SendMessageRequest<'a> {
    fn new(queue_url: &'a str, message: OutboundMessage) -> Self {
        Self {
            queue_url,
            message_body: message.body,
            message_group_id: message.group_id,
            message_deduplication_id: message.deduplication_id,
            message_attributes: message.attributes,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageResponse {
    #[serde(default)]
    message_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageBatchRequest<'a> {
    queue_url: &'a str,
    entries: Vec<BatchRequestEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BatchRequestEntry {
    id: String,
    message_body: String,
    message_group_id: String,
    message_deduplication_id: String,
    message_attributes: HashMap<String, MessageAttribute>,
}

impl From<BatchEntry> for BatchRequestEntry {
    fn from(entry: BatchEntry) -> Self {
        Self {
            id: entry.id,
            message_body: entry.message.body,
            message_group_id: entry.message.group_id,
            message_deduplication_id: entry.message.deduplication_id,
            message_attributes: entry.message.attributes,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageBatchResponse {
    #[serde(default)]
    successful: Vec<SuccessfulEntry>,
    #[serde(default)]
    failed: Vec<FailedEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SuccessfulEntry {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesRequest<'a> {
    queue_url: &'a str,
    attribute_names: &'a [&'a str],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesResponse {
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Deserialize)]
struct BackendError {
    #[serde(rename = "__type", alias = "code", default)]
    code: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}
