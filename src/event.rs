//! Error event model
//!
//! [`ExchangeSnapshot`] is the raw view of one request/response cycle handed
//! over by the framework adapter. [`ErrorEvent::from_exchange`] turns it into
//! the immutable record that sinks serialize, applying redaction and
//! truncation exactly once.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CaptureConfig;
use crate::policy::{filter_headers, truncate_body};
use crate::utils::{extract_ip, generate_id, header_value, timestamp_format};

/// Error that accompanied an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeError {
    /// Type name of the error, e.g. `std::io::Error`
    pub type_name: String,

    /// Display text; absent when the error renders as an empty string
    pub message: Option<String>,

    /// Formatted error and its source chain
    pub stack_trace: String,
}

impl ExchangeError {
    pub fn new(
        type_name: impl Into<String>,
        message: Option<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.filter(|m| !m.is_empty()),
            stack_trace: stack_trace.into(),
        }
    }

    /// Capture any error together with its `source()` chain
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        let type_name = std::any::type_name::<E>();
        let message = err.to_string();

        let mut trace = format!("{type_name}: {message}");
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push_str("\nCaused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }

        Self::new(type_name, Some(message), trace)
    }
}

/// Raw view of one exchange, before any policy is applied
#[derive(Debug, Clone, Default)]
pub struct ExchangeSnapshot {
    pub method: String,
    pub path: String,
    pub query_string: Option<String>,
    pub status_code: u16,

    /// Request headers as received; repeated names appear once per value
    pub request_headers: Vec<(String, String)>,
    pub response_headers: Vec<(String, String)>,

    /// Bodies as buffered by the framework; absent when not buffered
    pub request_body: Option<String>,
    pub response_body: Option<String>,

    pub error: Option<ExchangeError>,
    pub duration_ms: Option<u64>,

    /// Transport-level peer address
    pub remote_addr: Option<String>,
    pub protocol: Option<String>,
    pub scheme: Option<String>,
    pub server_name: Option<String>,
    pub server_port: Option<u16>,
}

impl ExchangeSnapshot {
    pub fn new(method: impl Into<String>, path: impl Into<String>, status_code: u16) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            status_code,
            ..Default::default()
        }
    }

    pub fn with_request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_response_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_request_body(mut self, body: impl Into<String>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    pub fn with_response_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = Some(body.into());
        self
    }

    pub fn with_error(mut self, error: ExchangeError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }
}

/// Captured error exchange, as delivered to sinks
///
/// Serialized as a flat camelCase JSON object; queue consumers depend on the
/// field names. Built once and never modified afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    id: String,
    application_name: String,
    method: String,
    path: String,
    status_code: u16,
    user_agent: Option<String>,
    remote_address: Option<String>,
    request_headers: HashMap<String, String>,
    response_headers: HashMap<String, String>,
    request_body: Option<String>,
    response_body: Option<String>,
    duration: Option<u64>,
    error_message: Option<String>,
    stack_trace: Option<String>,
    #[serde(with = "timestamp_format")]
    timestamp: DateTime<Utc>,
    additional_data: HashMap<String, Value>,
}

impl ErrorEvent {
    /// Build an event from a snapshot, applying header and body policy
    pub fn from_exchange(
        snapshot: &ExchangeSnapshot,
        config: &CaptureConfig,
        application_name: &str,
    ) -> Self {
        let headers = &snapshot.request_headers;

        Self {
            id: generate_id(),
            application_name: application_name.to_string(),
            method: snapshot.method.clone(),
            path: snapshot.path.clone(),
            status_code: snapshot.status_code,
            user_agent: header_value(headers, "user-agent").map(str::to_string),
            remote_address: extract_ip(headers, snapshot.remote_addr.as_deref()),
            request_headers: filter_headers(headers.iter().map(|(k, v)| (k, v)), config.include_headers),
            response_headers: filter_headers(
                snapshot.response_headers.iter().map(|(k, v)| (k, v)),
                config.include_headers,
            ),
            request_body: truncate_body(
                snapshot.request_body.as_deref(),
                config.max_body_size,
                config.include_request_body,
            ),
            response_body: truncate_body(
                snapshot.response_body.as_deref(),
                config.max_body_size,
                config.include_response_body,
            ),
            duration: snapshot.duration_ms,
            error_message: snapshot.error.as_ref().and_then(|e| e.message.clone()),
            stack_trace: snapshot.error.as_ref().map(|e| e.stack_trace.clone()),
            timestamp: Utc::now(),
            additional_data: additional_data(snapshot),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    pub fn request_headers(&self) -> &HashMap<String, String> {
        &self.request_headers
    }

    pub fn response_headers(&self) -> &HashMap<String, String> {
        &self.response_headers
    }

    pub fn request_body(&self) -> Option<&str> {
        self.request_body.as_deref()
    }

    pub fn response_body(&self) -> Option<&str> {
        self.response_body.as_deref()
    }

    /// Elapsed milliseconds, when known
    pub fn duration(&self) -> Option<u64> {
        self.duration
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    pub fn additional_data(&self) -> &HashMap<String, Value> {
        &self.additional_data
    }
}

// Only known values are recorded; anything that fails to parse is left out.
fn additional_data(snapshot: &ExchangeSnapshot) -> HashMap<String, Value> {
    let headers = &snapshot.request_headers;
    let mut data = HashMap::new();

    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            data.insert(key.to_string(), value);
        }
    };

    put("queryString", snapshot.query_string.clone().filter(|q| !q.is_empty()).map(Value::from));
    put("contentType", header_value(headers, "content-type").map(Value::from));
    put(
        "contentLength",
        header_value(headers, "content-length")
            .and_then(|len| len.parse::<u64>().ok())
            .map(Value::from),
    );
    put("protocol", snapshot.protocol.clone().map(Value::from));
    put("scheme", snapshot.scheme.clone().map(Value::from));
    put("serverName", snapshot.server_name.clone().map(Value::from));
    put("serverPort", snapshot.server_port.map(Value::from));
    put(
        "exceptionClass",
        snapshot.error.as_ref().map(|e| Value::from(e.type_name.clone())),
    );

    data
}
