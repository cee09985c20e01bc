use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
    tracing::{debug, info, warn},
};

use crate::{
    archive::ArchivedConversation,
    error::{Error, Result},
    message::Message,
    session::Session,
};

/// Timeouts and capacity bound applied uniformly to all sessions.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Quiet time after a user's last message before their queue batches.
    pub batch_timeout: Duration,
    /// Inactivity after which a conversation is declared over.
    pub conversation_timeout: Duration,
    /// Maximum number of concurrently tracked sessions.
    pub max_sessions: usize,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            batch_timeout: Duration::from_secs(40),
            conversation_timeout: Duration::from_secs(3600),
            max_sessions: 10,
        }
    }
}

/// Read-only snapshot for health reporting.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegistryStats {
    pub total_sessions: usize,
    /// Sessions whose conversation has not expired.
    pub active_sessions: usize,
    pub queued_messages: usize,
    pub sessions_with_pending_messages: usize,
}

/// Thread-safe map from user id to [`Session`], bounded by
/// [`SessionPolicy::max_sessions`].
///
/// One mutex covers all registry and per-session mutations, keeping the state
/// machine linearizable across concurrent transport handlers and the
/// scheduler. The lock is only ever held for in-memory work; network-bound
/// work (model calls, delivery, persistence) happens outside it, driven by
/// the snapshots these methods return.
pub struct SessionRegistry {
    policy: SessionPolicy,
    inner: Mutex<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an inbound message, creating the user's session if needed.
    ///
    /// If the user's existing session is conversation-expired, it is flushed:
    /// the old conversation is returned as a snapshot for archival and a
    /// fresh session transparently takes its place (the new message starts a
    /// clean conversation; the old queue is never merged forward).
    ///
    /// Never blocks on I/O; all-or-nothing under the registry lock.
    pub fn submit_inbound(&self, message: Message) -> Result<Option<ArchivedConversation>> {
        self.submit_inbound_at(message, Utc::now())
    }

    /// [`Self::submit_inbound`] with an explicit clock.
    pub fn submit_inbound_at(
        &self,
        message: Message,
        now: DateTime<Utc>,
    ) -> Result<Option<ArchivedConversation>> {
        let mut sessions = self.lock();
        let user_id = message.user_id.clone();

        let expired = sessions
            .get(&user_id)
            .is_some_and(|s| s.is_conversation_expired(self.policy.conversation_timeout, now));

        let mut flushed = None;
        if expired {
            if let Some(mut old) = sessions.remove(&user_id) {
                old.end_conversation(now);
                let snapshot = ArchivedConversation::from_session(&old);
                if snapshot.is_meaningful() {
                    flushed = Some(snapshot);
                }
            }
            info!(user_id = %user_id, "conversation expired, starting a fresh session");
            sessions.insert(user_id.clone(), Session::new(&user_id));
        } else if !sessions.contains_key(&user_id) {
            if sessions.len() >= self.policy.max_sessions {
                warn!(
                    user_id = %user_id,
                    max = self.policy.max_sessions,
                    "session capacity reached, rejecting new session"
                );
                return Err(Error::CapacityExceeded {
                    max: self.policy.max_sessions,
                });
            }
            debug!(user_id = %user_id, "creating session");
            sessions.insert(user_id.clone(), Session::new(&user_id));
        }

        if let Some(session) = sessions.get_mut(&user_id) {
            session.enqueue(message);
            debug!(user_id = %user_id, queued = session.queue_len(), "message enqueued");
        }
        Ok(flushed)
    }

    /// User ids whose sessions are ready to batch. Set semantics: callers
    /// must not rely on ordering across users.
    pub fn ready_for_batch(&self) -> Vec<String> {
        self.ready_for_batch_at(Utc::now())
    }

    /// [`Self::ready_for_batch`] with an explicit clock.
    pub fn ready_for_batch_at(&self, now: DateTime<Utc>) -> Vec<String> {
        self.lock()
            .values()
            .filter(|s| s.should_batch(self.policy.batch_timeout, now))
            .map(|s| s.user_id.clone())
            .collect()
    }

    /// Extract the user's pending batch and mark the session in flight.
    ///
    /// Readiness is re-checked under the lock, so a candidate from a prior
    /// [`Self::ready_for_batch`] that went stale in between (new message
    /// arrived, another extract won the race, session reaped) yields `None`
    /// instead of a premature or duplicate batch.
    pub fn extract(&self, user_id: &str) -> Option<Vec<Message>> {
        self.extract_at(user_id, Utc::now())
    }

    /// [`Self::extract`] with an explicit clock.
    pub fn extract_at(&self, user_id: &str, now: DateTime<Utc>) -> Option<Vec<Message>> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(user_id)?;
        if !session.should_batch(self.policy.batch_timeout, now) {
            return None;
        }
        Some(session.extract_batch())
    }

    /// Report the outcome of an extracted batch. Success clears the queue;
    /// failure retains it for the next pass (at-least-once). A missing
    /// session (reaped concurrently) is tolerated, not an error.
    pub fn complete(&self, user_id: &str, success: bool) {
        let mut sessions = self.lock();
        match sessions.get_mut(user_id) {
            Some(session) => session.complete(success),
            None => debug!(user_id = %user_id, "complete() for a reaped session, ignoring"),
        }
    }

    /// Remove every expired session, returning conversation snapshots for
    /// best-effort persistence (which happens outside the lock).
    pub fn reap_expired(&self) -> Vec<ArchivedConversation> {
        self.reap_expired_at(Utc::now())
    }

    /// [`Self::reap_expired`] with an explicit clock.
    pub fn reap_expired_at(&self, now: DateTime<Utc>) -> Vec<ArchivedConversation> {
        let mut sessions = self.lock();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.is_conversation_expired(self.policy.conversation_timeout, now))
            .map(|s| s.user_id.clone())
            .collect();

        let mut snapshots = Vec::with_capacity(expired.len());
        for user_id in expired {
            if let Some(mut session) = sessions.remove(&user_id) {
                session.end_conversation(now);
                info!(user_id = %user_id, queued = session.queue_len(), "reaping expired session");
                let snapshot = ArchivedConversation::from_session(&session);
                if snapshot.is_meaningful() {
                    snapshots.push(snapshot);
                }
            }
        }
        snapshots
    }

    /// Snapshot and remove every session, regardless of expiry. Used at
    /// shutdown so in-progress conversations reach the durable store.
    pub fn drain_all(&self) -> Vec<ArchivedConversation> {
        let now = Utc::now();
        let mut sessions = self.lock();
        sessions
            .drain()
            .map(|(_, mut session)| {
                session.end_conversation(now);
                ArchivedConversation::from_session(&session)
            })
            .filter(ArchivedConversation::is_meaningful)
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats_at(Utc::now())
    }

    /// [`Self::stats`] with an explicit clock.
    pub fn stats_at(&self, now: DateTime<Utc>) -> RegistryStats {
        let sessions = self.lock();
        let mut stats = RegistryStats {
            total_sessions: sessions.len(),
            active_sessions: 0,
            queued_messages: 0,
            sessions_with_pending_messages: 0,
        };
        for session in sessions.values() {
            let queued = session.queue_len();
            stats.queued_messages += queued;
            if queued > 0 {
                stats.sessions_with_pending_messages += 1;
            }
            if !session.is_conversation_expired(self.policy.conversation_timeout, now) {
                stats.active_sessions += 1;
            }
        }
        stats
    }
}
