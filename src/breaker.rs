//! Circuit breaker around the AI provider call.
//!
//! DESIGN
//! ======
//! Fails fast once the upstream shows `max_failures` consecutive errors, then
//! probes recovery after `reset_timeout` with a bounded number of half-open
//! trial calls. Transitions are serialized under a mutex; the guarded future
//! always runs outside the lock so a slow upstream call never blocks other
//! callers' gate checks.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// =============================================================================
// TYPES
// =============================================================================

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Normal operation; calls pass through.
    Closed,
    /// Failing fast; calls are rejected until the reset timeout elapses.
    Open,
    /// Probing recovery with a limited number of trial calls.
    HalfOpen,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

/// Result of gating a call through [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError<E> {
    /// Rejected without running the call: the circuit is open.
    #[error("circuit breaker is open")]
    Open,
    /// Rejected without running the call: half-open probe budget exhausted.
    #[error("too many requests in half-open state")]
    TooManyProbes,
    /// The call ran and failed; its error is passed through.
    #[error("{0}")]
    Inner(E),
}

impl<E> ExecuteError<E> {
    /// True when the breaker rejected the call without invoking it.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Open | Self::TooManyProbes)
    }
}

#[derive(Debug)]
enum Rejection {
    Open,
    TooManyProbes,
}

struct Inner {
    state: State,
    failures: u32,
    last_failure: Option<Instant>,
    half_open_probes: u32,
}

// =============================================================================
// BREAKER
// =============================================================================

pub struct CircuitBreaker {
    max_failures: u32,
    reset_timeout: Duration,
    half_open_max: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub const DEFAULT_MAX_FAILURES: u32 = 5;
    pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_HALF_OPEN_MAX: u32 = 1;

    #[must_use]
    pub fn new(max_failures: u32, reset_timeout: Duration, half_open_max: u32) -> Self {
        Self {
            max_failures: max_failures.max(1),
            reset_timeout,
            half_open_max: half_open_max.max(1),
            inner: Mutex::new(Inner { state: State::Closed, failures: 0, last_failure: None, half_open_probes: 0 }),
        }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Self::DEFAULT_MAX_FAILURES, Self::DEFAULT_RESET_TIMEOUT, Self::DEFAULT_HALF_OPEN_MAX)
    }

    /// Gate a single call. If admitted, the future runs (outside the lock) and
    /// its outcome updates breaker state; if denied, the future is dropped
    /// unpolled and a distinguished rejection is returned.
    ///
    /// # Errors
    ///
    /// `Open` / `TooManyProbes` on rejection, `Inner` when the call itself
    /// fails.
    pub async fn execute<T, E, F>(&self, call: F) -> Result<T, ExecuteError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if let Err(rejection) = self.before_request(Instant::now()) {
            return Err(match rejection {
                Rejection::Open => ExecuteError::Open,
                Rejection::TooManyProbes => ExecuteError::TooManyProbes,
            });
        }

        let result = call.await;
        self.after_request(result.is_ok(), Instant::now());
        result.map_err(ExecuteError::Inner)
    }

    fn before_request(&self, now: Instant) -> Result<(), Rejection> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => Ok(()),
            State::Open => {
                let quiet = inner.last_failure.map(|t| now.saturating_duration_since(t));
                if quiet.is_some_and(|q| q > self.reset_timeout) {
                    inner.state = State::HalfOpen;
                    inner.half_open_probes = 1;
                    Ok(())
                } else {
                    Err(Rejection::Open)
                }
            }
            State::HalfOpen => {
                if inner.half_open_probes >= self.half_open_max {
                    return Err(Rejection::TooManyProbes);
                }
                inner.half_open_probes += 1;
                Ok(())
            }
        }
    }

    fn after_request(&self, success: bool, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        if success {
            match inner.state {
                State::HalfOpen => {
                    inner.state = State::Closed;
                    inner.failures = 0;
                    inner.half_open_probes = 0;
                }
                State::Closed => inner.failures = 0,
                State::Open => {}
            }
        } else {
            inner.failures += 1;
            inner.last_failure = Some(now);
            if inner.state == State::HalfOpen || inner.failures >= self.max_failures {
                inner.state = State::Open;
            }
        }
    }

    /// Current state. Advisory: another caller may transition it immediately after.
    pub fn state(&self) -> State {
        self.inner.lock().unwrap().state
    }

    /// Consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.inner.lock().unwrap().failures
    }

    /// Administrative reset to closed with cleared counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Closed;
        inner.failures = 0;
        inner.half_open_probes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_secs(60), 1)
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), ExecuteError<Boom>> {
        cb.execute(async { Err::<(), _>(Boom) }).await.map(|()| ())
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), ExecuteError<Boom>> {
        cb.execute(async { Ok::<_, Boom>(()) }).await.map(|_| ())
    }

    #[tokio::test]
    async fn stays_closed_below_threshold() {
        let cb = breaker();
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), State::Closed);
        assert_eq!(cb.failures(), 2);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let cb = breaker();
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.failures(), 0);
        assert_eq!(cb.state(), State::Closed);
    }

    #[tokio::test]
    async fn opens_after_max_consecutive_failures() {
        let cb = breaker();
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        assert_eq!(cb.state(), State::Open);
    }

    #[tokio::test]
    async fn open_rejects_without_running_call() {
        let cb = breaker();
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        let ran = std::sync::atomic::AtomicBool::new(false);
        let result = cb
            .execute(async {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, Boom>(())
            })
            .await;
        assert!(matches!(result, Err(ExecuteError::Open)));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn quiet_period_admits_a_probe() {
        let cb = breaker();
        let start = Instant::now();
        for _ in 0..3 {
            assert!(cb.before_request(start).is_ok());
            cb.after_request(false, start);
        }
        assert_eq!(cb.state(), State::Open);

        // Within the timeout: still rejected.
        assert!(matches!(cb.before_request(start + Duration::from_secs(30)), Err(Rejection::Open)));

        // Past the timeout: one probe admitted, a second is over budget.
        let later = start + Duration::from_secs(61);
        assert!(cb.before_request(later).is_ok());
        assert_eq!(cb.state(), State::HalfOpen);
        assert!(matches!(cb.before_request(later), Err(Rejection::TooManyProbes)));
    }

    #[test]
    fn probe_success_closes_circuit() {
        let cb = breaker();
        let start = Instant::now();
        for _ in 0..3 {
            cb.before_request(start).unwrap();
            cb.after_request(false, start);
        }
        let later = start + Duration::from_secs(61);
        cb.before_request(later).unwrap();
        cb.after_request(true, later);
        assert_eq!(cb.state(), State::Closed);
        assert_eq!(cb.failures(), 0);
        // Fully open for business again.
        assert!(cb.before_request(later).is_ok());
        assert!(cb.before_request(later).is_ok());
    }

    #[test]
    fn probe_failure_reopens_circuit() {
        let cb = breaker();
        let start = Instant::now();
        for _ in 0..3 {
            cb.before_request(start).unwrap();
            cb.after_request(false, start);
        }
        let later = start + Duration::from_secs(61);
        cb.before_request(later).unwrap();
        cb.after_request(false, later);
        assert_eq!(cb.state(), State::Open);
        // The failure stamp is fresh, so calls are rejected again.
        assert!(matches!(cb.before_request(later + Duration::from_secs(1)), Err(Rejection::Open)));
    }

    #[tokio::test]
    async fn reset_clears_open_state() {
        let cb = breaker();
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        cb.reset();
        assert_eq!(cb.state(), State::Closed);
        succeed(&cb).await.unwrap();
    }

    #[tokio::test]
    async fn rejection_predicate_distinguishes_inner_errors() {
        let cb = breaker();
        let inner = fail(&cb).await.unwrap_err();
        assert!(!inner.is_rejection());
        for _ in 0..2 {
            fail(&cb).await.unwrap_err();
        }
        let rejected = succeed(&cb).await.unwrap_err();
        assert!(rejected.is_rejection());
    }
}
