//! Fire-and-forget capture orchestration
//!
//! The request path only ever performs a capture decision and a `try_send` on
//! a bounded channel. A fixed pool of Tokio tasks drains the channel, builds
//! events and hands them to the sink.
//!
//! ```text
//! Request path                     Worker pool
//! ────────────                     ───────────
//! capture_async()                  [worker 0..N]
//!     │ should_capture()               ▲
//!     │ try_send()                     │ recv()
//!     ▼                                │
//! [Bounded queue] ─────────────────────┘ ──► build event ──► ErrorSink
//! ```
//!
//! When the queue is full the task is dropped and counted. Errors and panics
//! inside workers are logged and counted, never surfaced to the caller.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::decision::should_capture;
use crate::error::CaptureError;
use crate::event::{ErrorEvent, ExchangeSnapshot};
use crate::queue::HttpQueueClient;
use crate::sink::{ErrorSink, QueueSink};

/// Log a warning once per this many dropped tasks
const DROP_LOG_THRESHOLD: u64 = 100;

enum CaptureTask {
    Exchange(Box<ExchangeSnapshot>),
    Batch(Vec<ErrorEvent>),
}

/// Counters describing what the pipeline did with capture requests
#[derive(Debug, Default)]
pub struct CaptureStats {
    /// Tasks accepted onto the worker queue
    pub scheduled: AtomicU64,
    /// Requests ignored (disabled, rejected by the decision, empty batch)
    pub skipped: AtomicU64,
    /// Tasks dropped because the queue was full or shut down
    pub dropped: AtomicU64,
    /// Tasks whose sink call returned an error or panicked
    pub failed: AtomicU64,
}

impl CaptureStats {
    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CaptureStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStatsSnapshot {
    pub scheduled: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub failed: u64,
}

impl CaptureStatsSnapshot {
    /// Dropped tasks as a percentage of attempted ones
    pub fn drop_rate(&self) -> f64 {
        let total = self.scheduled + self.dropped;
        if total == 0 {
            0.0
        } else {
            (self.dropped as f64 / total as f64) * 100.0
        }
    }
}

/// Entry point the framework adapter calls for every completed exchange
///
/// Must be created inside a Tokio runtime: the worker tasks are spawned on
/// construction.
pub struct CaptureOrchestrator {
    config: Arc<Config>,
    sink: Arc<dyn ErrorSink>,
    sender: RwLock<Option<mpsc::Sender<CaptureTask>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<CaptureStats>,
}

impl CaptureOrchestrator {
    /// Start the worker pool over an explicitly chosen sink
    pub fn new(config: Config, sink: Arc<dyn ErrorSink>) -> Self {
        let config = Arc::new(config);
        let stats = Arc::new(CaptureStats::default());

        let (sender, receiver) = mpsc::channel(config.dispatch.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..config.dispatch.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    receiver.clone(),
                    sink.clone(),
                    config.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        tracing::info!(
            application = %config.application_name,
            workers = config.dispatch.workers.max(1),
            queue_capacity = config.dispatch.queue_capacity.max(1),
            capture_enabled = config.capture.enabled,
            "error capture pipeline started"
        );

        Self {
            config,
            sink,
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            stats,
        }
    }

    /// Start the worker pool over the default queue sink
    ///
    /// Falls back to a disabled sink (events are built and discarded) when
    /// the queue is not configured.
    pub fn from_config(config: Config) -> Self {
        let sink: Arc<dyn ErrorSink> = match build_queue_sink(&config) {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                tracing::warn!(error = %e, "error event queue unavailable, events will be discarded");
                Arc::new(DisabledSink)
            }
        };
        Self::new(config, sink)
    }

    /// Load configuration from the environment and start over the queue sink
    pub fn from_env() -> Self {
        Self::from_config(Config::from_env())
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Schedule capture of one exchange; returns immediately
    pub fn capture_async(&self, snapshot: ExchangeSnapshot) {
        if !should_capture(snapshot.status_code, &snapshot.path, &self.config.capture) {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.schedule(CaptureTask::Exchange(Box::new(snapshot)));
    }

    /// Schedule one batch publish of pre-built events; returns immediately
    pub fn capture_batch_async(&self, events: Vec<ErrorEvent>) {
        if !self.config.capture.enabled || events.is_empty() {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.schedule(CaptureTask::Batch(events));
    }

    /// Whether the sink's destination is reachable; never errors
    pub async fn health_check(&self) -> bool {
        AssertUnwindSafe(self.sink.health_check())
            .catch_unwind()
            .await
            .unwrap_or(false)
    }

    pub fn stats(&self) -> CaptureStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting work and wait for queued tasks to drain
    ///
    /// Workers still busy when `timeout` elapses are aborted and their events
    /// lost. Returns `true` when everything drained in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let sender = match self.sender.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if workers.is_empty() {
            return true;
        }

        let aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();
        let drained = tokio::time::timeout(timeout, futures::future::join_all(workers))
            .await
            .is_ok();

        if drained {
            tracing::info!("error capture pipeline drained");
        } else {
            aborts.iter().for_each(|handle| handle.abort());
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "error capture pipeline shutdown timed out, abandoning in-flight events"
            );
        }
        drained
    }

    /// [`shutdown`](Self::shutdown) with the configured timeout
    pub async fn close(&self) -> bool {
        self.shutdown(self.config.dispatch.shutdown_timeout()).await
    }

    fn schedule(&self, task: CaptureTask) {
        let result = match self.sender.read() {
            Ok(guard) => match guard.as_ref() {
                Some(sender) => sender.try_send(task).map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => CaptureError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => CaptureError::ShutDown,
                }),
                None => Err(CaptureError::ShutDown),
            },
            Err(_) => Err(CaptureError::ShutDown),
        };

        match result {
            Ok(()) => {
                self.stats.scheduled.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                // One warning per threshold to avoid log spam under overload.
                if dropped == 1 || dropped % DROP_LOG_THRESHOLD == 0 {
                    tracing::warn!(total_dropped = dropped, reason = %e, "dropping error capture task");
                }
            }
        }
    }
}

impl std::fmt::Debug for CaptureOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureOrchestrator")
            .field("application_name", &self.config.application_name)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

fn build_queue_sink(config: &Config) -> Result<QueueSink, CaptureError> {
    if !config.sink.enabled {
        return Err(CaptureError::from_string("sink disabled by configuration"));
    }
    let client = HttpQueueClient::from_config(&config.sink)?;
    Ok(QueueSink::new(Arc::new(client), config.sink.clone()).with_debug(config.debug))
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<CaptureTask>>>,
    sink: Arc<dyn ErrorSink>,
    config: Arc<Config>,
    stats: Arc<CaptureStats>,
) {
    loop {
        let task = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(task) = task else {
            break;
        };

        let outcome = AssertUnwindSafe(execute(task, sink.as_ref(), &config))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker = worker_id, error = %e, "failed to publish error event");
            }
            Err(_) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker = worker_id, "error capture task panicked");
            }
        }
    }

    tracing::debug!(worker = worker_id, "error capture worker stopped");
}

async fn execute(task: CaptureTask, sink: &dyn ErrorSink, config: &Config) -> Result<(), CaptureError> {
    match task {
        CaptureTask::Exchange(snapshot) => {
            let event = ErrorEvent::from_exchange(&snapshot, &config.capture, &config.application_name);
            sink.publish(&event).await
        }
        CaptureTask::Batch(events) => sink.publish_batch(&events).await,
    }
}

/// Stand-in used when no destination is configured
struct DisabledSink;

#[async_trait::async_trait]
impl ErrorSink for DisabledSink {
    async fn publish(&self, _event: &ErrorEvent) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn publish_batch(&self, _events: &[ErrorEvent]) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn health_check(&self) -> bool {
        false
    }
}
