use async_trait::async_trait;

/// Send one text segment to a user on the messaging platform.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(&self, user_id: &str, text: &str) -> anyhow::Result<()>;
}
