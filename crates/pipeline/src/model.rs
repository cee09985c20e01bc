use async_trait::async_trait;

/// Reserved reply value meaning "send nothing back this turn". A silent turn
/// is a successful outcome: the queue is cleared and no delivery happens.
pub const SILENT_SENTINEL: &str = "[SILENT]";

/// One merged conversational turn, ready for the model.
#[derive(Debug, Clone)]
pub struct ModelTurn {
    pub user_id: String,
    /// Batch contents merged with [`crate::merge_batch`].
    pub text: String,
    /// Recalled memory from previous conversations, if any.
    pub context: Option<String>,
}

/// What the model decided to do with a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    /// Reply text, possibly containing segmentation markers.
    Text(String),
    /// Deliberate silence.
    Silent,
}

/// The language-model backend. Call-level timeouts are this implementation's
/// responsibility; the scheduler never cancels a turn mid-flight.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, turn: ModelTurn) -> anyhow::Result<ModelReply>;
}

/// Durable memory queried for context before a model call and appended to
/// after a delivered reply. Both directions are best-effort.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Relevant prior-conversation notes for this turn, if any.
    async fn recall(&self, user_id: &str, query: &str) -> anyhow::Result<Option<String>>;

    /// Record the finished exchange.
    async fn remember(&self, user_id: &str, turn: &str, reply: &str) -> anyhow::Result<()>;
}
