use std::{
    sync::Arc,
    time::Instant,
};

use tracing::warn;

use huddle_sessions::{ArchiveSink, ArchivedConversation, Error as SessionError, Message, SessionRegistry};

/// View of the scheduler exposed on `/status`, implemented by the scheduler
/// itself in the binary and by stubs in tests.
pub trait SchedulerHealth: Send + Sync {
    fn running(&self) -> bool;
    fn ticks(&self) -> u64;
}

impl SchedulerHealth for huddle_scheduler::BatchScheduler {
    fn running(&self) -> bool {
        self.is_running()
    }

    fn ticks(&self) -> u64 {
        self.tick_count()
    }
}

/// Shared state behind every gateway route.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub archive: Option<Arc<dyn ArchiveSink>>,
    pub scheduler: Option<Arc<dyn SchedulerHealth>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            archive: None,
            scheduler: None,
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn ArchiveSink>) -> Self {
        self.archive = Some(archive);
        self
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn SchedulerHealth>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Enqueue an inbound message. If the submit flushed an expired
    /// conversation, hand the snapshot to the archive on a detached task so
    /// the request cycle never waits on the database.
    pub fn submit(&self, message: Message) -> Result<(), SessionError> {
        let flushed = self.registry.submit_inbound(message)?;
        if let (Some(conversation), Some(archive)) = (flushed, self.archive.clone()) {
            tokio::spawn(async move {
                archive_best_effort(archive, conversation).await;
            });
        }
        Ok(())
    }
}

pub(crate) async fn archive_best_effort(
    archive: Arc<dyn ArchiveSink>,
    conversation: ArchivedConversation,
) {
    let user_id = conversation.user_id.clone();
    if let Err(e) = archive.archive(conversation).await {
        warn!(user_id = %user_id, error = %format!("{e:#}"), "failed to archive flushed conversation");
    }
}
