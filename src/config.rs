//! Configuration for the capture pipeline
//!
//! Every struct deserializes with defaults, so a host can bind it from any
//! serde source. [`Config::from_env`] loads it from environment variables with
//! fail-soft behaviour: bad values fall back to defaults with a warning and a
//! missing queue URL disables delivery without affecting the host.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

/// Status codes captured when none are configured
pub const DEFAULT_STATUS_CODES: [u16; 8] = [400, 401, 403, 404, 500, 502, 503, 504];

/// Path prefixes never captured when none are configured
pub const DEFAULT_EXCLUDED_PATHS: [&str; 3] = ["/health", "/actuator", "/metrics"];

/// Default body budget, in characters
pub const DEFAULT_MAX_BODY_SIZE: usize = 10_240;

/// Default number of events per batch send
pub const DEFAULT_BATCH_SIZE: usize = 10;

const ENV_PREFIX: &str = "ERRORWATCH_";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the producing process, stamped on every event
    pub application_name: String,

    /// Which exchanges are captured and what goes into the event
    pub capture: CaptureConfig,

    /// Where events are delivered
    pub sink: SinkConfig,

    /// Background worker pool sizing
    pub dispatch: DispatchConfig,

    /// Log serialized payloads before sending
    pub debug: bool,
}

/// Capture policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,

    /// Exact status codes to capture (no ranges)
    pub status_codes: HashSet<u16>,

    /// Path prefixes to skip, matched case-insensitively
    pub excluded_paths: Vec<String>,

    pub include_headers: bool,
    pub include_request_body: bool,
    pub include_response_body: bool,

    /// Body budget in characters (Unicode scalar values, not bytes).
    /// The truncation marker is appended on top of this budget.
    pub max_body_size: usize,
}

/// Queue sink settings
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub enabled: bool,

    /// Destination queue identity
    pub queue_url: Option<String>,

    /// Transport endpoint; the queue URL is used when unset
    pub endpoint: Option<String>,

    /// Optional bearer credential for the queue gateway
    pub api_key: Option<String>,

    /// Maximum events per batch send
    pub batch_size: usize,

    pub request_timeout_ms: u64,
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("enabled", &self.enabled)
            .field("queue_url", &self.queue_url)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("batch_size", &self.batch_size)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Worker pool settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub shutdown_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application_name: "application".to_string(),
            capture: CaptureConfig::default(),
            sink: SinkConfig::default(),
            dispatch: DispatchConfig::default(),
            debug: false,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            status_codes: DEFAULT_STATUS_CODES.into_iter().collect(),
            excluded_paths: DEFAULT_EXCLUDED_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            include_headers: true,
            include_request_body: true,
            include_response_body: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_url: None,
            endpoint: None,
            api_key: None,
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout_ms: 5_000,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl CaptureConfig {
    /// A config that captures nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

impl SinkConfig {
    /// Sink config pointing at a queue
    pub fn for_queue(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: Some(queue_url.into()),
            ..Default::default()
        }
    }

    /// Get the queue URL (returns error if missing)
    pub fn get_queue_url(&self) -> Result<&str, crate::error::CaptureError> {
        self.queue_url
            .as_deref()
            .ok_or(crate::error::CaptureError::MissingConfig)
    }

    /// Endpoint requests are sent to
    pub fn resolved_endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().or(self.queue_url.as_deref())
    }

    /// Batch size clamped to at least one
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl DispatchConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Config {
    /// Load configuration from `ERRORWATCH_*` environment variables
    ///
    /// Never panics: unparsable values keep their defaults and a missing
    /// queue URL turns the sink off.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let capture = CaptureConfig {
            enabled: env_bool("ENABLED").unwrap_or(defaults.capture.enabled),
            status_codes: env_list("STATUS_CODES")
                .map(|codes| parse_status_codes(&codes))
                .filter(|codes| !codes.is_empty())
                .unwrap_or(defaults.capture.status_codes),
            excluded_paths: env_list("EXCLUDED_PATHS").unwrap_or(defaults.capture.excluded_paths),
            include_headers: env_bool("INCLUDE_HEADERS").unwrap_or(defaults.capture.include_headers),
            include_request_body: env_bool("INCLUDE_REQUEST_BODY")
                .unwrap_or(defaults.capture.include_request_body),
            include_response_body: env_bool("INCLUDE_RESPONSE_BODY")
                .unwrap_or(defaults.capture.include_response_body),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.capture.max_body_size),
        };

        let queue_url = env_string("QUEUE_URL");
        let sink_enabled = env_bool("SINK_ENABLED").unwrap_or(true);
        if sink_enabled && queue_url.is_none() {
            tracing::warn!(
                "ERRORWATCH_QUEUE_URL is missing, captured errors will not be delivered"
            );
        }

        let sink = SinkConfig {
            enabled: sink_enabled && queue_url.is_some(),
            queue_url,
            endpoint: env_string("QUEUE_ENDPOINT"),
            api_key: env_string("QUEUE_API_KEY"),
            batch_size: env_parse("BATCH_SIZE").unwrap_or(defaults.sink.batch_size),
            request_timeout_ms: defaults.sink.request_timeout_ms,
        };

        let dispatch = DispatchConfig {
            workers: env_parse("WORKERS").unwrap_or(defaults.dispatch.workers),
            queue_capacity: env_parse("QUEUE_CAPACITY").unwrap_or(defaults.dispatch.queue_capacity),
            shutdown_timeout_ms: defaults.dispatch.shutdown_timeout_ms,
        };

        let config = Self {
            application_name: env_string("APPLICATION_NAME").unwrap_or(defaults.application_name),
            capture,
            sink,
            dispatch,
            debug: env_bool("DEBUG").unwrap_or(false),
        };

        if !config.capture.enabled {
            tracing::info!("error capture disabled by configuration");
        } else if config.debug {
            tracing::info!(
                application = %config.application_name,
                queue_url = config.sink.queue_url.as_deref().unwrap_or("<none>"),
                "error capture initialized (debug mode)"
            );
        }

        config
    }

    /// Wrap config in Arc for thread-safe sharing
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = env_string(key)?;
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key = %format!("{ENV_PREFIX}{key}"), value = %raw, "ignoring invalid boolean");
            None
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = %format!("{ENV_PREFIX}{key}"), value = %raw, "ignoring invalid number");
            None
        }
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_string(key).map(|raw| split_list(&raw))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_status_codes(values: &[String]) -> HashSet<u16> {
    values
        .iter()
        .filter_map(|v| match v.parse::<u16>() {
            Ok(code) => Some(code),
            Err(_) => {
                tracing::warn!(value = %v, "ignoring invalid status code");
                None
            }
        })
        .collect()
}
