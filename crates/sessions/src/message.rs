use {
    chrono::{DateTime, Utc},
    huddle_common::types::MessageKind,
    serde::{Deserialize, Serialize},
};

/// One inbound unit of user content. Immutable once created; owned by the
/// session queue until extracted into a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Platform-assigned id, or synthesized by the transport adapter.
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub received_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            content: content.into(),
            kind,
            received_at: Utc::now(),
        }
    }

    /// Convenience constructor for a text message stamped now.
    pub fn text(
        id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(id, user_id, content, MessageKind::Text)
    }

    /// Override the arrival timestamp. Callers that need a deterministic
    /// clock (or replay platform timestamps) set it explicitly.
    #[must_use]
    pub fn with_received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }
}
