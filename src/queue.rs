//! Bounded request queue with a worker pool.
//!
//! DESIGN
//! ======
//! Absorbs bursty inbound AI traffic in a bounded channel and processes it
//! with a fixed pool of workers. Admission is a single non-blocking offer:
//! a full queue rejects the newest request immediately (`Full`), which the
//! HTTP layer maps to a retryable "server busy" response.
//!
//! Each request carries a single-shot reply channel. The worker is the sole
//! writer and the handler the sole reader; the oneshot send completes
//! immediately whether or not the handler is still listening, so a departed
//! caller turns the reply into a logged discard and can never wedge a worker.
//!
//! ORDERING
//! ========
//! Dequeue order is FIFO at the channel, but completion order is unordered:
//! workers interleave and upstream latency varies.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("request queue is full")]
    Full,
    #[error("request queue is closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
#[error("queue stop timed out")]
pub struct StopTimeout;

/// Why a request finished without a processor result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("request cancelled before processing")]
    Cancelled,
    #[error("internal error processing request")]
    Internal,
    #[error("processing failed: {0}")]
    Failed(String),
}

/// A queued unit of work. Owned by the enqueuer until accepted; ownership
/// transfers to a worker on dequeue.
pub struct QueuedRequest<J, R> {
    /// Correlation id, minted by the caller.
    pub id: Uuid,
    /// Opaque payload handed to the processor.
    pub job: J,
    /// The caller's deadline; work is skipped once it has passed.
    pub deadline: Instant,
    /// Write-once reply channel of capacity one.
    pub reply: oneshot::Sender<Result<R, DispatchError>>,
    /// Admission instant, for queue-wait diagnostics.
    pub enqueued_at: Instant,
}

impl<J, R> QueuedRequest<J, R> {
    /// Build a request with its paired reply receiver.
    pub fn new(job: J, deadline: Instant) -> (Self, oneshot::Receiver<Result<R, DispatchError>>) {
        let (reply, rx) = oneshot::channel();
        (Self { id: Uuid::new_v4(), job, deadline, reply, enqueued_at: Instant::now() }, rx)
    }
}

/// Async processor invoked by workers for each dequeued request.
pub type Processor<J, R> = Arc<dyn Fn(J) -> BoxFuture<'static, Result<R, DispatchError>> + Send + Sync>;

/// Queue configuration.
pub struct QueueConfig {
    pub queue_size: usize,
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { queue_size: 1000, workers: 10 }
    }
}

/// Point-in-time queue statistics, exposed on the health endpoint.
///
/// Counters are monotonic and satisfy
/// `total_enqueued = total_processed + total_failed + total_dropped + in_flight + queue_size`
/// (every admission attempt is counted, including drops).
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub workers: usize,
    pub total_enqueued: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_dropped: u64,
    pub in_flight: u64,
    pub closed: bool,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    in_flight: AtomicU64,
}

// =============================================================================
// QUEUE
// =============================================================================

pub struct RequestQueue<J, R> {
    /// `None` once the queue is closed; dropping the sender lets workers drain.
    tx: std::sync::Mutex<Option<mpsc::Sender<QueuedRequest<J, R>>>>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    /// Flipped on forced shutdown; workers abandon in-flight work.
    shutdown_tx: watch::Sender<bool>,
    counters: Arc<Counters>,
    capacity: usize,
    worker_count: usize,
}

impl<J, R> RequestQueue<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    /// Create the queue and start its worker pool.
    #[must_use]
    pub fn start(config: QueueConfig, processor: Processor<J, R>) -> Arc<Self> {
        let capacity = config.queue_size.max(1);
        let worker_count = config.workers.max(1);

        let (tx, rx) = mpsc::channel::<QueuedRequest<J, R>>(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let (shutdown_tx, _) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        info!(capacity, workers = worker_count, "starting request queue");

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = Arc::clone(&rx);
            let processor = Arc::clone(&processor);
            let counters = Arc::clone(&counters);
            let shutdown = shutdown_tx.subscribe();
            handles.push(tokio::spawn(worker_loop(worker_id, rx, processor, counters, shutdown)));
        }

        Arc::new(Self {
            tx: std::sync::Mutex::new(Some(tx)),
            workers: std::sync::Mutex::new(handles),
            shutdown_tx,
            counters,
            capacity,
            worker_count,
        })
    }

    /// Offer a request without blocking.
    ///
    /// # Errors
    ///
    /// `Full` when the queue is at capacity (the request is dropped-newest),
    /// `Closed` after shutdown has begun.
    pub fn enqueue(&self, req: QueuedRequest<J, R>) -> Result<(), EnqueueError> {
        let guard = self.tx.lock().unwrap();
        let Some(tx) = guard.as_ref() else {
            return Err(EnqueueError::Closed);
        };

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        match tx.try_send(req) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(req)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(id = %req.id, capacity = self.capacity, "request dropped, queue full");
                Err(EnqueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Stop accepting work, then wait up to `timeout` for workers to drain.
    /// On timeout, in-flight work is abandoned via the shutdown signal.
    ///
    /// # Errors
    ///
    /// `StopTimeout` when workers did not drain in time.
    pub async fn stop(&self, timeout: Duration) -> Result<(), StopTimeout> {
        let tx = self.tx.lock().unwrap().take();
        if tx.is_none() {
            return Ok(());
        }
        drop(tx);

        info!("stopping request queue");
        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock().unwrap());
        let drain = futures::future::join_all(handles);

        if tokio::time::timeout(timeout, drain).await.is_ok() {
            info!("request queue stopped gracefully");
            Ok(())
        } else {
            warn!("queue stop timeout, cancelling workers");
            let _ = self.shutdown_tx.send(true);
            Err(StopTimeout)
        }
    }

    /// Snapshot of counters and depth. Read consistency across fields is
    /// advisory; the set is for diagnostics, never for admission decisions.
    pub fn stats(&self) -> QueueStats {
        let guard = self.tx.lock().unwrap();
        let queue_size = guard.as_ref().map_or(0, |tx| self.capacity - tx.capacity());
        QueueStats {
            queue_size,
            queue_capacity: self.capacity,
            workers: self.worker_count,
            total_enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            total_processed: self.counters.processed.load(Ordering::Relaxed),
            total_failed: self.counters.failed.load(Ordering::Relaxed),
            total_dropped: self.counters.dropped.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            closed: guard.is_none(),
        }
    }

    /// Current queue depth.
    pub fn depth(&self) -> usize {
        self.stats().queue_size
    }
}

// =============================================================================
// WORKER
// =============================================================================

async fn worker_loop<J, R>(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<QueuedRequest<J, R>>>>,
    processor: Processor<J, R>,
    counters: Arc<Counters>,
    mut shutdown: watch::Receiver<bool>,
) where
    J: Send + 'static,
    R: Send + 'static,
{
    debug!(worker_id, "worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let req = {
            let mut guard = rx.lock().await;
            tokio::select! {
                req = guard.recv() => req,
                _ = shutdown.changed() => None,
            }
        };
        let Some(req) = req else { break };

        process_request(worker_id, req, &processor, &counters, &mut shutdown).await;
    }
    debug!(worker_id, "worker stopped");
}

async fn process_request<J, R>(
    worker_id: usize,
    req: QueuedRequest<J, R>,
    processor: &Processor<J, R>,
    counters: &Counters,
    shutdown: &mut watch::Receiver<bool>,
) where
    J: Send + 'static,
    R: Send + 'static,
{
    let waited = req.enqueued_at.elapsed();
    debug!(worker_id, id = %req.id, waited_ms = waited.as_millis() as u64, "processing request");

    // The caller may have given up while the request sat in the queue.
    if req.reply.is_closed() || Instant::now() >= req.deadline {
        counters.failed.fetch_add(1, Ordering::Relaxed);
        let _ = req.reply.send(Err(DispatchError::Cancelled));
        return;
    }

    counters.in_flight.fetch_add(1, Ordering::Relaxed);

    let guarded = AssertUnwindSafe((processor)(req.job)).catch_unwind();
    let result = tokio::select! {
        outcome = guarded => match outcome {
            Ok(result) => result,
            Err(_) => {
                error!(worker_id, id = %req.id, "panic while processing request");
                Err(DispatchError::Internal)
            }
        },
        _ = shutdown.changed() => Err(DispatchError::Cancelled),
    };

    counters.in_flight.fetch_sub(1, Ordering::Relaxed);
    match &result {
        Ok(_) => counters.processed.fetch_add(1, Ordering::Relaxed),
        Err(_) => counters.failed.fetch_add(1, Ordering::Relaxed),
    };

    // Non-blocking by construction: a departed caller just drops the receiver.
    if req.reply.send(result).is_err() {
        warn!(worker_id, id = %req.id, "caller gone, result discarded");
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
