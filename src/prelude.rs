//! Convenience re-exports for easy importing
//!
//! Import everything you need with:
//! ```rust
//! use errorwatch_actix::prelude::*;
//! ```

pub use crate::config::Config;
pub use crate::dispatch::CaptureOrchestrator;
pub use crate::error::CaptureError;
pub use crate::event::{ErrorEvent, ExchangeSnapshot};
pub use crate::middleware::ErrorWatchMiddleware;
pub use crate::sink::{ErrorSink, QueueSink};
