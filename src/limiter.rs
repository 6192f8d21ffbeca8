//! Token-bucket limiter for outbound AI calls.
//!
//! DESIGN
//! ======
//! One shared bucket paces every dispatch worker, so the aggregate call rate
//! against the provider never exceeds the configured rate regardless of how
//! many workers are running. Tokens accrue continuously; `allow` is the
//! non-blocking form, `wait` suspends until a token is available. Waiters are
//! served in FIFO order: an async mutex gate queues them, and only the waiter
//! holding the gate sleeps for the next token.
//!
//! Cancellation is the caller's concern: bound `wait` with
//! `tokio::time::timeout` and treat elapse as a failed acquisition.

use std::sync::Mutex;
use std::time::{Duration, Instant};

// =============================================================================
// BUCKET STATE
// =============================================================================

struct Bucket {
    /// Current token count, `0.0..=burst`.
    tokens: f64,
    /// Refill rate in tokens per second.
    rate: f64,
    /// Maximum tokens that may accumulate.
    burst: f64,
    /// Last refill instant.
    updated: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.updated = now;
    }

    /// Consume one token if available, else report how long until one accrues.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        let deficit = 1.0 - self.tokens;
        Err(Duration::from_secs_f64(deficit / self.rate))
    }
}

// =============================================================================
// LIMITER
// =============================================================================

/// Shared token-bucket limiter. Safe for concurrent callers.
pub struct TokenBucket {
    state: Mutex<Bucket>,
    /// Serializes waiters so token grants are FIFO.
    gate: tokio::sync::Mutex<()>,
}

impl TokenBucket {
    /// `max_requests` per `interval`, with burst capacity `max_requests`.
    /// A full bucket is available immediately.
    #[must_use]
    pub fn new(max_requests: usize, interval: Duration) -> Self {
        let max_requests = max_requests.max(1);
        let rate = max_requests as f64 / interval.as_secs_f64().max(f64::MIN_POSITIVE);
        Self {
            state: Mutex::new(Bucket {
                tokens: max_requests as f64,
                rate,
                burst: max_requests as f64,
                updated: Instant::now(),
            }),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Consume a token without blocking. Returns `true` iff one was taken.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&self, now: Instant) -> bool {
        self.state.lock().unwrap().try_take(now).is_ok()
    }

    /// Suspend until a token is consumed. FIFO among concurrent waiters.
    ///
    /// Callers enforce deadlines with `tokio::time::timeout`; dropping the
    /// future releases the waiter's place in line.
    pub async fn wait(&self) {
        let _front = self.gate.lock().await;
        loop {
            let pause = match self.state.lock().unwrap().try_take(Instant::now()) {
                Ok(()) => return,
                Err(pause) => pause,
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// Reconfigure rate and burst. Takes effect on the next acquisition;
    /// accumulated tokens are clamped to the new burst.
    pub fn set_limit(&self, max_requests: usize, interval: Duration) {
        let max_requests = max_requests.max(1);
        let mut bucket = self.state.lock().unwrap();
        bucket.refill(Instant::now());
        bucket.rate = max_requests as f64 / interval.as_secs_f64().max(f64::MIN_POSITIVE);
        bucket.burst = max_requests as f64;
        bucket.tokens = bucket.tokens.min(bucket.burst);
    }

    /// Currently available tokens (after refill). Advisory, for diagnostics.
    pub fn tokens(&self) -> f64 {
        let mut bucket = self.state.lock().unwrap();
        bucket.refill(Instant::now());
        bucket.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn allow_consumes_burst_then_denies() {
        let bucket = TokenBucket::new(5, Duration::from_secs(60));
        let now = Instant::now();
        for i in 0..5 {
            assert!(bucket.allow_at(now), "token {i} should be granted");
        }
        assert!(!bucket.allow_at(now));
    }

    #[test]
    fn tokens_never_exceed_burst() {
        let bucket = TokenBucket::new(3, Duration::from_secs(1));
        let start = Instant::now();
        // Far in the future the bucket is full again, not over-full.
        assert!(bucket.allow_at(start + Duration::from_secs(100)));
        assert!((bucket.state.lock().unwrap().tokens - 2.0).abs() < 1e-6);
    }

    #[test]
    fn refill_grants_after_interval() {
        let bucket = TokenBucket::new(1, Duration::from_secs(1));
        let start = Instant::now();
        assert!(bucket.allow_at(start));
        assert!(!bucket.allow_at(start + Duration::from_millis(500)));
        assert!(bucket.allow_at(start + Duration::from_millis(1100)));
    }

    #[test]
    fn set_limit_clamps_accumulated_tokens() {
        let bucket = TokenBucket::new(10, Duration::from_secs(1));
        bucket.set_limit(2, Duration::from_secs(1));
        let now = Instant::now();
        assert!(bucket.allow_at(now));
        assert!(bucket.allow_at(now));
        assert!(!bucket.allow_at(now));
    }

    #[tokio::test]
    async fn wait_returns_immediately_with_tokens() {
        let bucket = TokenBucket::new(2, Duration::from_secs(60));
        let before = Instant::now();
        bucket.wait().await;
        assert!(before.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn wait_paces_an_empty_bucket() {
        // 50 tokens/sec, burst 1: second acquisition must wait ~20ms.
        let bucket = TokenBucket::new(1, Duration::from_millis(20));
        bucket.wait().await;
        let before = Instant::now();
        bucket.wait().await;
        assert!(before.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn timeout_bounds_wait() {
        let bucket = TokenBucket::new(1, Duration::from_secs(60));
        assert!(bucket.allow());
        let result = tokio::time::timeout(Duration::from_millis(30), bucket.wait()).await;
        assert!(result.is_err(), "empty bucket must not grant within the timeout");
    }

    #[tokio::test]
    async fn concurrent_waiters_respect_rate_ceiling() {
        // r = 100/s, b = 1. Five waiters need ~40ms for the last grant.
        let bucket = Arc::new(TokenBucket::new(1, Duration::from_millis(10)));
        bucket.wait().await;
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let bucket = Arc::clone(&bucket);
            handles.push(tokio::spawn(async move { bucket.wait().await }));
        }
        for h in handles {
            h.await.unwrap();
        }
        // 4 grants at 1 per 10ms cannot finish faster than ~30ms.
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
