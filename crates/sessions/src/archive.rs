use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    huddle_common::types::MessageKind,
    serde::{Deserialize, Serialize},
};

use crate::{message::Message, session::Session};

/// One message inside an archived conversation snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub message_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for ArchivedMessage {
    fn from(m: &Message) -> Self {
        Self {
            message_id: m.id.clone(),
            content: m.content.clone(),
            kind: m.kind,
            timestamp: m.received_at,
        }
    }
}

/// Best-effort snapshot of a finished (or flushed) conversation, handed to a
/// durable store when a session expires. Not required to be transactionally
/// consistent with in-memory removal: removal proceeds even if persisting
/// this snapshot fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedConversation {
    pub user_id: String,
    pub messages: Vec<ArchivedMessage>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ArchivedConversation {
    pub(crate) fn from_session(session: &Session) -> Self {
        Self {
            user_id: session.user_id.clone(),
            messages: session.queued().iter().map(ArchivedMessage::from).collect(),
            started_at: session.started_at(),
            ended_at: session.ended_at(),
        }
    }

    /// A snapshot worth keeping: the conversation saw at least one message.
    pub fn is_meaningful(&self) -> bool {
        self.started_at.is_some() || !self.messages.is_empty()
    }
}

/// Durable sink for expired conversations. Implemented by the memory store;
/// the registry itself never performs I/O.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    async fn archive(&self, conversation: ArchivedConversation) -> anyhow::Result<()>;
}
