//! # ErrorWatch Actix
//!
//! Error capture middleware for Actix-Web applications.
//!
//! Exchanges that end in a configured error status are turned into scrubbed,
//! size-bounded events and shipped to a managed queue in the background.
//! Design principles:
//!
//! - **Non-blocking**: the request path only runs a capture decision and a
//!   `try_send`; a bounded worker pool does the rest
//! - **Fail-safe**: missing config, queue outages and full queues never reach
//!   the request; events are dropped and counted instead
//! - **Secure**: credential headers are stripped and bodies truncated before an
//!   event exists
//! - **Pluggable**: the destination is any [`ErrorSink`]; [`QueueSink`] is the
//!   default
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use actix_web::{web, App, HttpResponse, HttpServer};
//! use errorwatch_actix::{CaptureOrchestrator, ErrorWatchMiddleware};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     std::env::set_var("ERRORWATCH_APPLICATION_NAME", "users-api");
//!     std::env::set_var("ERRORWATCH_QUEUE_URL", "https://sqs.eu-west-1.amazonaws.com/123/errors.fifo");
//!
//!     let orchestrator = Arc::new(CaptureOrchestrator::from_env());
//!
//!     let server_orchestrator = orchestrator.clone();
//!     HttpServer::new(move || {
//!         App::new()
//!             .wrap(ErrorWatchMiddleware::new(server_orchestrator.clone()))
//!             .route("/", web::get().to(|| async { HttpResponse::Ok().body("Hello!") }))
//!     })
//!     .bind("0.0.0.0:8080")?
//!     .run()
//!     .await?;
//!
//!     orchestrator.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## How It Works
//!
//! 1. The middleware skips disabled configs and excluded paths outright
//! 2. Text request bodies are buffered and replayed to the handler
//! 3. When the response status is in the capture set, the response body is
//!    buffered and a snapshot handed to [`CaptureOrchestrator::capture_async`]
//! 4. A worker builds the [`ErrorEvent`] and calls the sink
//! 5. [`QueueSink`] sends one grouped, deduplicated message per event, or
//!    concurrent chunks for batches, logging partial failures
//!
//! ## Architecture
//!
//! - `decision`: which exchanges are captured
//! - `policy`: header redaction and body truncation
//! - `event`: exchange snapshot and the immutable error event
//! - `dispatch`: bounded worker pool and capture entry points
//! - `sink`: sink trait and the default queue sink
//! - `queue`: queue client trait and HTTP transport
//! - `middleware`, `request_body`, `response_body`: Actix-Web integration
//! - `health`: liveness route
//! - `config`, `error`, `utils`: configuration, error types, helpers

pub mod config;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod health;
pub mod middleware;
pub mod policy;
pub mod prelude;
pub mod queue;
pub mod request_body;
pub mod response_body;
pub mod sink;
pub mod utils;

// Re-export main components for easy access
pub use config::{CaptureConfig, Config, DispatchConfig, SinkConfig};
pub use decision::should_capture;
pub use dispatch::{CaptureOrchestrator, CaptureStatsSnapshot};
pub use error::CaptureError;
pub use event::{ErrorEvent, ExchangeError, ExchangeSnapshot};
pub use middleware::ErrorWatchMiddleware;
pub use policy::{filter_headers, truncate_body};
pub use queue::{HttpQueueClient, QueueClient};
pub use sink::{ErrorSink, QueueSink};
