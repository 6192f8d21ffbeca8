//! In-memory sliding-window rate limiting at the HTTP boundary.
//!
//! DESIGN
//! ======
//! Per-principal timestamp lists backed by `HashMap<String, VecDeque<Instant>>`.
//! A principal is the authenticated user id when available, else the remote
//! address. On each request the list is pruned to the trailing window; a
//! principal with `limit` surviving entries is denied.
//!
//! LOCKING
//! =======
//! The outer mutex covers only map growth and entry lookup; each entry has its
//! own mutex for the timestamp list. The hot path never holds both. The
//! periodic sweeper uses `try_lock` on entries: a busy entry is by definition
//! not stale.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

/// How often the background sweep evicts idle principals.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

type Entry = Arc<Mutex<VecDeque<Instant>>>;

// =============================================================================
// LIMITER
// =============================================================================

/// Sliding-window ingress limiter. Clone is cheap; clones share state.
#[derive(Clone)]
pub struct SlidingWindow {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    limit: usize,
    window: Duration,
}

impl SlidingWindow {
    /// At most `limit` requests per principal in any trailing `window`.
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), limit: limit.max(1), window }
    }

    /// Record a request for `id` if it is within quota. Returns `false` when
    /// the principal has exhausted the window.
    pub fn allow(&self, id: &str) -> bool {
        self.allow_at(id, Instant::now())
    }

    fn allow_at(&self, id: &str, now: Instant) -> bool {
        // Outer lock: lookup/growth only.
        let entry = {
            let mut entries = self.entries.lock().unwrap();
            Arc::clone(entries.entry(id.to_string()).or_default())
        };

        let mut timestamps = entry.lock().unwrap();
        prune(&mut timestamps, now, self.window);
        if timestamps.len() >= self.limit {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Drop principals with no activity inside the window, to bound memory.
    fn sweep(&self, now: Instant) {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| {
            // Skip entries currently in use; active means not stale.
            let Ok(timestamps) = entry.try_lock() else {
                return true;
            };
            match timestamps.back() {
                Some(&newest) => now.saturating_duration_since(newest) <= self.window,
                None => false,
            }
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "swept idle rate-limit entries");
        }
    }

    /// Spawn the periodic sweeper. Abort the returned handle at shutdown.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                limiter.sweep(Instant::now());
            }
        })
    }

    /// Number of tracked principals. Diagnostics only.
    pub fn tracked(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = timestamps.front() {
        if now.saturating_duration_since(front) > window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 5;
    const WINDOW: Duration = Duration::from_secs(60);

    fn limiter() -> SlidingWindow {
        SlidingWindow::new(LIMIT, WINDOW)
    }

    #[test]
    fn allows_up_to_limit() {
        let rl = limiter();
        let now = Instant::now();
        for i in 0..LIMIT {
            assert!(rl.allow_at("user-a", now), "request {i} should pass");
        }
        assert!(!rl.allow_at("user-a", now));
    }

    #[test]
    fn window_expiry_allows_new_requests() {
        let rl = limiter();
        let start = Instant::now();
        for _ in 0..LIMIT {
            assert!(rl.allow_at("user-a", start));
        }
        assert!(!rl.allow_at("user-a", start));

        let after = start + WINDOW + Duration::from_millis(1);
        assert!(rl.allow_at("user-a", after));
    }

    #[test]
    fn partial_expiry_frees_partial_quota() {
        let rl = SlidingWindow::new(2, WINDOW);
        let start = Instant::now();
        assert!(rl.allow_at("u", start));
        assert!(rl.allow_at("u", start + Duration::from_secs(30)));
        assert!(!rl.allow_at("u", start + Duration::from_secs(31)));
        // First timestamp ages out; one slot opens.
        let later = start + WINDOW + Duration::from_secs(1);
        assert!(rl.allow_at("u", later));
        assert!(!rl.allow_at("u", later));
    }

    #[test]
    fn principals_do_not_interfere() {
        let rl = limiter();
        let now = Instant::now();
        for _ in 0..LIMIT {
            rl.allow_at("user-a", now);
        }
        assert!(!rl.allow_at("user-a", now));
        assert!(rl.allow_at("user-b", now));
    }

    #[test]
    fn sweep_evicts_idle_principals() {
        let rl = limiter();
        let start = Instant::now();
        rl.allow_at("idle", start);
        rl.allow_at("active", start);
        rl.allow_at("active", start + WINDOW + Duration::from_secs(30));
        assert_eq!(rl.tracked(), 2);

        rl.sweep(start + WINDOW + Duration::from_secs(31));
        assert_eq!(rl.tracked(), 1);
        // The evicted principal starts fresh.
        assert!(rl.allow_at("idle", start + WINDOW + Duration::from_secs(32)));
    }

    #[test]
    fn sweep_keeps_recent_entries() {
        let rl = limiter();
        let now = Instant::now();
        rl.allow_at("fresh", now);
        rl.sweep(now + Duration::from_secs(1));
        assert_eq!(rl.tracked(), 1);
    }

    #[test]
    fn concurrent_principals_stay_within_quota() {
        let rl = Arc::new(SlidingWindow::new(100, WINDOW));
        let mut handles = Vec::new();
        for t in 0..4 {
            let rl = Arc::clone(&rl);
            handles.push(std::thread::spawn(move || {
                let id = format!("worker-{t}");
                (0..200).filter(|_| rl.allow(&id)).count()
            }));
        }
        for h in handles {
            assert_eq!(h.join().unwrap(), 100);
        }
    }
}
