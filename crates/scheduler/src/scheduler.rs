use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::FutureExt,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use huddle_sessions::{ArchiveSink, Message, SessionRegistry};

/// Consumer of extracted batches. The processing pipeline implements this;
/// tests substitute lightweight mocks.
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    /// Turn one user's batch into a model turn and deliver the reply.
    /// An `Err` retains the queue for the next scheduling pass.
    async fn process(&self, user_id: &str, batch: &[Message]) -> anyhow::Result<()>;
}

/// Loop pacing knobs.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Interval between readiness scans.
    pub poll_interval: Duration,
    /// Extra sleep after an unexpected loop-level failure, so a persistent
    /// fault does not busy-spin the scan.
    pub error_backoff: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Polls the registry for batch-ready sessions and hands each batch to the
/// processor on its own task, reporting the outcome back via
/// [`SessionRegistry::complete`]. Also runs the expiry reap once per tick and
/// forwards reaped conversations to the archive sink.
pub struct BatchScheduler {
    registry: Arc<SessionRegistry>,
    processor: Arc<dyn BatchProcessor>,
    archive: Option<Arc<dyn ArchiveSink>>,
    options: SchedulerOptions,
    ticks: AtomicU64,
    running: AtomicBool,
}

impl BatchScheduler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        processor: Arc<dyn BatchProcessor>,
        archive: Option<Arc<dyn ArchiveSink>>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            registry,
            processor,
            archive,
            options,
            ticks: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    /// Whether the polling loop is currently alive (for the status surface).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Completed scan count (for the status surface).
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Run the polling loop until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            poll_interval_secs = self.options.poll_interval.as_secs_f64(),
            "batch scheduler started"
        );
        self.running.store(true, Ordering::Relaxed);

        let mut interval = tokio::time::interval(self.options.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    // A panicking tick must not kill batching for every user:
                    // log, back off, keep polling.
                    let tick = std::panic::AssertUnwindSafe(self.tick()).catch_unwind();
                    if let Err(panic) = tick.await {
                        error!(panic = %panic_message(panic.as_ref()), "scheduler tick panicked, backing off");
                        tokio::time::sleep(self.options.error_backoff).await;
                    }
                    self.ticks.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.running.store(false, Ordering::Relaxed);
        info!("batch scheduler stopped");
    }

    /// One scan: dispatch every ready session, then reap expired ones.
    /// Returns the number of batches dispatched (mostly for tests).
    pub async fn tick(&self) -> usize {
        let candidates = self.registry.ready_for_batch();
        if !candidates.is_empty() {
            debug!(candidates = candidates.len(), "sessions ready for batching");
        }

        let mut dispatched = 0;
        for user_id in candidates {
            // Re-checked under the lock; a stale candidate yields None.
            let Some(batch) = self.registry.extract(&user_id) else {
                continue;
            };
            dispatched += 1;
            self.dispatch(user_id, batch);
        }

        for conversation in self.registry.reap_expired() {
            let Some(archive) = &self.archive else { continue };
            if let Err(e) = archive.archive(conversation).await {
                // Data loss accepted over blocking live traffic.
                warn!(error = %format!("{e:#}"), "failed to archive expired conversation");
            }
        }

        dispatched
    }

    /// Process one batch on its own task so a slow model call never blocks
    /// the scan or other users. The session's processing flag keeps per-user
    /// ordering across ticks.
    fn dispatch(&self, user_id: String, batch: Vec<Message>) {
        let registry = Arc::clone(&self.registry);
        let processor = Arc::clone(&self.processor);
        info!(user_id = %user_id, messages = batch.len(), "dispatching batch");

        tokio::spawn(async move {
            let outcome = std::panic::AssertUnwindSafe(processor.process(&user_id, &batch))
                .catch_unwind()
                .await;
            let success = match outcome {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!(user_id = %user_id, error = %format!("{e:#}"), "batch processing failed, queue retained");
                    false
                },
                Err(panic) => {
                    error!(user_id = %user_id, panic = %panic_message(panic.as_ref()), "batch processor panicked, queue retained");
                    false
                },
            };
            registry.complete(&user_id, success);
        });
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
