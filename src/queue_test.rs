use super::*;

use std::sync::atomic::AtomicUsize;

fn echo_processor() -> Processor<String, String> {
    Arc::new(|job: String| async move { Ok::<_, DispatchError>(format!("echo: {job}")) }.boxed())
}

/// Processor that parks until the notify fires, to pin workers in-flight.
fn parked_processor(release: Arc<tokio::sync::Notify>) -> Processor<String, String> {
    Arc::new(move |job: String| {
        let release = Arc::clone(&release);
        async move {
            release.notified().await;
            Ok::<_, DispatchError>(job)
        }
        .boxed()
    })
}

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(60)
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn processes_a_request_and_replies() {
    let queue = RequestQueue::start(QueueConfig { queue_size: 10, workers: 2 }, echo_processor());
    let (req, rx) = QueuedRequest::new("hello".to_string(), deadline());
    queue.enqueue(req).unwrap();

    let result = rx.await.unwrap().unwrap();
    assert_eq!(result, "echo: hello");

    let stats = queue.stats();
    assert_eq!(stats.total_enqueued, 1);
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.total_failed, 0);
}

#[tokio::test]
async fn many_requests_all_complete() {
    let queue = RequestQueue::start(QueueConfig { queue_size: 100, workers: 4 }, echo_processor());
    let mut receivers = Vec::new();
    for i in 0..50 {
        let (req, rx) = QueuedRequest::new(format!("job-{i}"), deadline());
        queue.enqueue(req).unwrap();
        receivers.push(rx);
    }
    for rx in receivers {
        assert!(rx.await.unwrap().is_ok());
    }
    assert_eq!(queue.stats().total_processed, 50);
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test]
async fn full_queue_rejects_newest() {
    let release = Arc::new(tokio::sync::Notify::new());
    let queue = RequestQueue::start(QueueConfig { queue_size: 2, workers: 1 }, parked_processor(Arc::clone(&release)));

    // First request is dequeued and parks the only worker.
    let (req, _rx0) = QueuedRequest::new("in-flight".to_string(), deadline());
    queue.enqueue(req).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Two more fill the channel.
    let (req, _rx1) = QueuedRequest::new("queued-1".to_string(), deadline());
    queue.enqueue(req).unwrap();
    let (req, _rx2) = QueuedRequest::new("queued-2".to_string(), deadline());
    queue.enqueue(req).unwrap();

    // The next offer observes a full queue immediately.
    let started = Instant::now();
    let (req, _rx3) = QueuedRequest::new("overflow".to_string(), deadline());
    assert_eq!(queue.enqueue(req).unwrap_err(), EnqueueError::Full);
    assert!(started.elapsed() < Duration::from_millis(50));

    let stats = queue.stats();
    assert_eq!(stats.total_dropped, 1);
    assert_eq!(stats.queue_size, 2);

    release.notify_waiters();
}

#[tokio::test]
async fn stopped_queue_rejects_with_closed() {
    let queue = RequestQueue::start(QueueConfig { queue_size: 4, workers: 1 }, echo_processor());
    queue.stop(Duration::from_secs(1)).await.unwrap();

    let (req, _rx) = QueuedRequest::new("late".to_string(), deadline());
    assert_eq!(queue.enqueue(req).unwrap_err(), EnqueueError::Closed);
    assert!(queue.stats().closed);
}

// =============================================================================
// Dead and departed callers
// =============================================================================

#[tokio::test]
async fn departed_caller_does_not_wedge_worker() {
    let queue = RequestQueue::start(QueueConfig { queue_size: 4, workers: 1 }, echo_processor());

    let (req, rx) = QueuedRequest::new("abandoned".to_string(), deadline());
    drop(rx);
    queue.enqueue(req).unwrap();

    // The worker must stay healthy and serve the next caller.
    let (req, rx) = QueuedRequest::new("served".to_string(), deadline());
    queue.enqueue(req).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap();
    assert_eq!(result.unwrap().unwrap(), "echo: served");
}

#[tokio::test]
async fn expired_deadline_yields_cancelled() {
    let release = Arc::new(tokio::sync::Notify::new());
    let queue = RequestQueue::start(QueueConfig { queue_size: 4, workers: 1 }, parked_processor(Arc::clone(&release)));

    // Pin the worker so the second request waits in the queue past its deadline.
    let (req, _parked) = QueuedRequest::new("pin".to_string(), deadline());
    queue.enqueue(req).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (req, rx) = QueuedRequest::new("stale".to_string(), Instant::now() + Duration::from_millis(30));
    queue.enqueue(req).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    release.notify_waiters();

    let result = rx.await.unwrap();
    assert_eq!(result.unwrap_err(), DispatchError::Cancelled);
}

// =============================================================================
// Panic isolation
// =============================================================================

#[tokio::test]
async fn panicking_processor_reports_internal_error_and_worker_survives() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_proc = Arc::clone(&calls);
    let processor: Processor<String, String> = Arc::new(move |job: String| {
        let calls = Arc::clone(&calls_in_proc);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if job == "bad" {
                panic!("processor exploded");
            }
            Ok::<_, DispatchError>(job)
        }
        .boxed()
    });
    let queue = RequestQueue::start(QueueConfig { queue_size: 4, workers: 1 }, processor);

    let (req, rx) = QueuedRequest::new("bad".to_string(), deadline());
    queue.enqueue(req).unwrap();
    assert_eq!(rx.await.unwrap().unwrap_err(), DispatchError::Internal);

    let (req, rx) = QueuedRequest::new("good".to_string(), deadline());
    queue.enqueue(req).unwrap();
    assert_eq!(rx.await.unwrap().unwrap(), "good");

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let stats = queue.stats();
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.total_processed, 1);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn stop_drains_pending_work() {
    let queue = RequestQueue::start(QueueConfig { queue_size: 32, workers: 2 }, echo_processor());
    let mut receivers = Vec::new();
    for i in 0..10 {
        let (req, rx) = QueuedRequest::new(format!("drain-{i}"), deadline());
        queue.enqueue(req).unwrap();
        receivers.push(rx);
    }

    queue.stop(Duration::from_secs(2)).await.unwrap();

    for rx in receivers {
        assert!(rx.await.unwrap().is_ok());
    }
    assert_eq!(queue.stats().total_processed, 10);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let queue = RequestQueue::start(QueueConfig { queue_size: 4, workers: 1 }, echo_processor());
    queue.stop(Duration::from_secs(1)).await.unwrap();
    queue.stop(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn stop_timeout_abandons_in_flight_work() {
    let release = Arc::new(tokio::sync::Notify::new());
    let queue = RequestQueue::start(QueueConfig { queue_size: 4, workers: 1 }, parked_processor(release));

    let (req, rx) = QueuedRequest::new("stuck".to_string(), deadline());
    queue.enqueue(req).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(queue.stop(Duration::from_millis(50)).await.is_err());

    // The abandoned request resolves as cancelled once the worker observes shutdown.
    let result = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap();
    assert_eq!(result.unwrap().unwrap_err(), DispatchError::Cancelled);
}

// =============================================================================
// Counters
// =============================================================================

#[tokio::test]
async fn counter_invariant_holds_after_mixed_load() {
    let queue = RequestQueue::start(QueueConfig { queue_size: 8, workers: 2 }, echo_processor());
    let mut receivers = Vec::new();
    for i in 0..6 {
        let (req, rx) = QueuedRequest::new(format!("n-{i}"), deadline());
        queue.enqueue(req).unwrap();
        receivers.push(rx);
    }
    for rx in receivers {
        let _ = rx.await;
    }

    let stats = queue.stats();
    assert_eq!(
        stats.total_enqueued,
        stats.total_processed + stats.total_failed + stats.total_dropped + stats.in_flight + stats.queue_size as u64
    );
}
