//! Restart-on-panic supervision for long-lived background loops.
//!
//! A crashed scheduler silently stops all batching, so its loop runs under a
//! supervisor that restarts it after a panic. The restart decision lives in
//! [`RestartPolicy`]/[`RestartTracker`], separate from task plumbing, so it
//! can be exercised without real timing.

use std::time::{Duration, Instant};

use {
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

/// Bounds on how eagerly a crashed worker is restarted.
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    /// Maximum restarts within `window` before giving up.
    pub max_restarts: u32,
    /// Sliding window over which restarts are counted.
    pub window: Duration,
    /// Pause before each restart.
    pub backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            window: Duration::from_secs(60),
            backoff: Duration::from_secs(5),
        }
    }
}

/// Tracks recent failures and decides whether another restart is allowed.
#[derive(Debug)]
pub struct RestartTracker {
    policy: RestartPolicy,
    failures: Vec<Instant>,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            failures: Vec::new(),
        }
    }

    /// Record a failure at `now`. Returns the backoff to sleep before the
    /// next attempt, or `None` when the restart budget inside the sliding
    /// window is exhausted.
    pub fn next_delay(&mut self, now: Instant) -> Option<Duration> {
        self.failures
            .retain(|t| now.saturating_duration_since(*t) < self.policy.window);
        self.failures.push(now);
        (self.failures.len() <= self.policy.max_restarts as usize).then_some(self.policy.backoff)
    }
}

/// Spawn `factory`'s future and keep it alive: a panicked run is restarted
/// per `policy`, a clean return or `shutdown` ends supervision.
pub fn spawn_supervised<F, Fut>(
    name: &'static str,
    policy: RestartPolicy,
    shutdown: CancellationToken,
    mut factory: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut tracker = RestartTracker::new(policy);
        loop {
            let mut worker = tokio::spawn(factory());
            tokio::select! {
                _ = shutdown.cancelled() => {
                    worker.abort();
                    info!(task = name, "supervisor shut down");
                    return;
                }
                outcome = &mut worker => match outcome {
                    Ok(()) => {
                        info!(task = name, "worker finished cleanly");
                        return;
                    },
                    Err(e) if e.is_panic() => match tracker.next_delay(Instant::now()) {
                        Some(delay) => {
                            warn!(task = name, delay_secs = delay.as_secs_f64(), "worker panicked, restarting");
                            tokio::select! {
                                _ = shutdown.cancelled() => return,
                                _ = tokio::time::sleep(delay) => {},
                            }
                        },
                        None => {
                            error!(task = name, "worker panicked too often, giving up");
                            return;
                        },
                    },
                    // Cancelled from outside; nothing to restart.
                    Err(_) => return,
                }
            }
        }
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    fn policy(max: u32, window_ms: u64, backoff_ms: u64) -> RestartPolicy {
        RestartPolicy {
            max_restarts: max,
            window: Duration::from_millis(window_ms),
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    #[test]
    fn tracker_allows_up_to_budget_within_window() {
        let mut tracker = RestartTracker::new(policy(2, 1000, 10));
        let t0 = Instant::now();
        assert!(tracker.next_delay(t0).is_some());
        assert!(tracker.next_delay(t0 + Duration::from_millis(100)).is_some());
        // Third failure inside the window exhausts the budget.
        assert!(tracker.next_delay(t0 + Duration::from_millis(200)).is_none());
    }

    #[test]
    fn tracker_forgets_failures_outside_window() {
        let mut tracker = RestartTracker::new(policy(1, 100, 10));
        let t0 = Instant::now();
        assert!(tracker.next_delay(t0).is_some());
        assert!(tracker.next_delay(t0 + Duration::from_millis(50)).is_none());
        // Well past the window, the slate is clean again.
        assert!(tracker.next_delay(t0 + Duration::from_millis(500)).is_some());
    }

    #[test]
    fn tracker_returns_configured_backoff() {
        let mut tracker = RestartTracker::new(policy(3, 1000, 250));
        assert_eq!(
            tracker.next_delay(Instant::now()),
            Some(Duration::from_millis(250))
        );
    }

    #[tokio::test]
    async fn supervisor_restarts_after_panic_then_worker_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let shutdown = CancellationToken::new();

        let handle = spawn_supervised("test-worker", policy(5, 10_000, 1), shutdown.clone(), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    panic!("transient failure");
                }
            }
        });

        handle.await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn supervisor_gives_up_when_budget_is_exhausted() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let shutdown = CancellationToken::new();

        let handle = spawn_supervised("doomed-worker", policy(2, 10_000, 1), shutdown.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { panic!("always fails") }
        });

        handle.await.unwrap();
        // Initial run + two allowed restarts.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn supervisor_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let handle = spawn_supervised(
            "idle-worker",
            RestartPolicy::default(),
            shutdown.clone(),
            || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            },
        );

        shutdown.cancel();
        handle.await.unwrap();
    }
}
