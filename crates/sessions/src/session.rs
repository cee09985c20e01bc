use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::message::Message;

/// Per-user conversational state: a pending-message queue plus the timestamps
/// that drive the two timeouts (batch quiet period, conversation expiry).
///
/// All predicates take `now` explicitly so timing behaviour is checkable
/// without sleeping; the registry passes the wall clock in production.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    queue: Vec<Message>,
    last_message_at: Option<DateTime<Utc>>,
    processing: bool,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            queue: Vec::new(),
            last_message_at: None,
            processing: false,
            started_at: None,
            ended_at: None,
        }
    }

    /// Append a message. Always succeeds; the message's own arrival timestamp
    /// becomes the new quiet-period anchor. A message landing in a session
    /// that was marked ended (but not yet reaped) un-ends it.
    pub fn enqueue(&mut self, message: Message) {
        self.last_message_at = Some(message.received_at);
        if self.started_at.is_none() {
            self.started_at = Some(message.received_at);
        }
        self.ended_at = None;
        self.queue.push(message);
    }

    /// Ready to batch: non-empty queue, no batch in flight, and the quiet
    /// period has elapsed since the last message.
    pub fn should_batch(&self, batch_timeout: Duration, now: DateTime<Utc>) -> bool {
        if self.queue.is_empty() || self.processing {
            return false;
        }
        match self.last_message_at {
            Some(last) => elapsed_at_least(last, now, batch_timeout),
            None => false,
        }
    }

    /// A conversation is over either explicitly (`ended_at` set), vacuously
    /// (never started), or by prolonged silence measured from the most recent
    /// activity.
    pub fn is_conversation_expired(
        &self,
        conversation_timeout: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(started) = self.started_at else {
            return true;
        };
        if self.ended_at.is_some() {
            return true;
        }
        let anchor = self.last_message_at.unwrap_or(started);
        elapsed_at_least(anchor, now, conversation_timeout)
    }

    /// Snapshot the queue for processing and mark the session in flight.
    /// The queue is deliberately NOT cleared here: clearing happens only on
    /// confirmed success, so a failed downstream call retries the same batch
    /// without message loss.
    pub fn extract_batch(&mut self) -> Vec<Message> {
        self.processing = true;
        self.queue.clone()
    }

    /// Report the outcome of the in-flight batch. On success the queue is
    /// cleared; on failure it is retained for the next scheduling pass.
    ///
    /// A no-op when nothing is in flight: that makes double-completion
    /// idempotent and protects a session that replaced an expired one from
    /// having its untouched queue cleared by the old batch's completion.
    pub fn complete(&mut self, success: bool) {
        if !self.processing {
            return;
        }
        self.processing = false;
        if success {
            self.queue.clear();
        }
    }

    pub fn end_conversation(&mut self, now: DateTime<Utc>) {
        self.ended_at = Some(now);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn queued(&self) -> &[Message] {
        &self.queue
    }

    pub(crate) fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub(crate) fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }
}

fn elapsed_at_least(since: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    let threshold = TimeDelta::from_std(threshold).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(since) >= threshold
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, chrono::Duration as ChronoDuration};

    const BATCH: Duration = Duration::from_secs(2);
    const CONVO: Duration = Duration::from_secs(3600);

    fn msg(id: &str, at: DateTime<Utc>) -> Message {
        Message::text(id, "u1", format!("body-{id}")).with_received_at(at)
    }

    #[test]
    fn empty_session_never_batches() {
        let s = Session::new("u1");
        assert!(!s.should_batch(BATCH, Utc::now()));
    }

    #[test]
    fn batches_only_after_quiet_period_since_last_message() {
        let t0 = Utc::now();
        let t1 = t0 + ChronoDuration::seconds(1);
        let mut s = Session::new("u1");
        s.enqueue(msg("m1", t0));
        s.enqueue(msg("m2", t1));

        // 0.5s after the last message: still inside the burst.
        assert!(!s.should_batch(BATCH, t1 + ChronoDuration::milliseconds(500)));
        // 2.1s after the last message: quiet period elapsed.
        assert!(s.should_batch(BATCH, t1 + ChronoDuration::milliseconds(2100)));
    }

    #[test]
    fn extract_preserves_arrival_order_and_blocks_rebatch() {
        let t0 = Utc::now();
        let mut s = Session::new("u1");
        s.enqueue(msg("m1", t0));
        s.enqueue(msg("m2", t0 + ChronoDuration::seconds(1)));

        let batch = s.extract_batch();
        assert_eq!(
            batch.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            ["m1", "m2"]
        );
        // In flight: even a long-elapsed quiet period must not re-batch.
        assert!(!s.should_batch(BATCH, t0 + ChronoDuration::hours(1)));
        // Queue untouched until success.
        assert_eq!(s.queue_len(), 2);
    }

    #[test]
    fn failure_retains_queue_success_clears_it() {
        let t0 = Utc::now();
        let mut s = Session::new("u1");
        s.enqueue(msg("m1", t0));

        s.extract_batch();
        s.complete(false);
        assert_eq!(s.queue_len(), 1);
        assert!(s.should_batch(BATCH, t0 + ChronoDuration::seconds(3)));

        s.extract_batch();
        s.complete(true);
        assert_eq!(s.queue_len(), 0);
        assert!(!s.should_batch(BATCH, t0 + ChronoDuration::seconds(10)));

        // Second success in a row is a harmless no-op.
        s.complete(true);
        assert_eq!(s.queue_len(), 0);
    }

    #[test]
    fn complete_without_extract_leaves_queue_alone() {
        let t0 = Utc::now();
        let mut s = Session::new("u1");
        s.enqueue(msg("m1", t0));

        // No batch in flight: a stray completion must not clear the queue.
        s.complete(true);
        assert_eq!(s.queue_len(), 1);
        assert!(s.should_batch(BATCH, t0 + ChronoDuration::seconds(3)));
    }

    #[test]
    fn fresh_session_counts_as_expired() {
        let s = Session::new("u1");
        assert!(s.is_conversation_expired(CONVO, Utc::now()));
    }

    #[test]
    fn expiry_measured_from_latest_activity() {
        let t0 = Utc::now();
        let mut s = Session::new("u1");
        s.enqueue(msg("m1", t0));
        assert!(!s.is_conversation_expired(CONVO, t0 + ChronoDuration::seconds(10)));
        assert!(s.is_conversation_expired(CONVO, t0 + ChronoDuration::seconds(3600)));

        // A later message pushes the expiry horizon out.
        let t1 = t0 + ChronoDuration::seconds(3000);
        s.enqueue(msg("m2", t1));
        assert!(!s.is_conversation_expired(CONVO, t0 + ChronoDuration::seconds(3600)));
    }

    #[test]
    fn ended_conversation_is_expired_until_new_message_arrives() {
        let t0 = Utc::now();
        let mut s = Session::new("u1");
        s.enqueue(msg("m1", t0));
        s.end_conversation(t0 + ChronoDuration::seconds(5));
        assert!(s.is_conversation_expired(CONVO, t0 + ChronoDuration::seconds(6)));

        // New message un-ends the session.
        s.enqueue(msg("m2", t0 + ChronoDuration::seconds(7)));
        assert!(!s.is_conversation_expired(CONVO, t0 + ChronoDuration::seconds(8)));
    }
}
