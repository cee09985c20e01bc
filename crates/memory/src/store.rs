use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{Row, SqlitePool},
    tracing::debug,
};

use {
    huddle_pipeline::ContextStore,
    huddle_sessions::{ArchiveSink, ArchivedConversation},
};

use crate::score::{RELEVANCE_FLOOR, keyword_overlap};

/// How many recent rows the keyword search scans.
const SEARCH_WINDOW: u32 = 50;

/// One remembered exchange.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub id: i64,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed store for per-user memories and archived conversations.
pub struct MemoryStore {
    pool: SqlitePool,
    max_items_per_user: u32,
}

impl MemoryStore {
    pub fn new(pool: SqlitePool, max_items_per_user: u32) -> Self {
        Self {
            pool,
            max_items_per_user,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables on first use.
    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_user ON memories (user_id, id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                started_at TEXT,
                ended_at TEXT,
                messages TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations (user_id, id)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a memory row, evicting the user's oldest rows beyond the cap.
    pub async fn add_memory(&self, user_id: &str, content: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO memories (user_id, content, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(content)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "DELETE FROM memories WHERE user_id = ? AND id NOT IN (
                SELECT id FROM memories WHERE user_id = ? ORDER BY id DESC LIMIT ?
            )",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(i64::from(self.max_items_per_user))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent memories, newest first.
    pub async fn recent(&self, user_id: &str, limit: u32) -> anyhow::Result<Vec<MemoryEntry>> {
        let rows = sqlx::query(
            "SELECT id, user_id, content, created_at FROM memories
             WHERE user_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    /// Keyword-overlap search over the user's recent memories. Results are
    /// ordered by score; anything under the relevance floor is dropped.
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<MemoryEntry>> {
        let window = self.recent(user_id, SEARCH_WINDOW).await?;
        let mut scored: Vec<(f64, MemoryEntry)> = window
            .into_iter()
            .map(|entry| (keyword_overlap(query, &entry.content), entry))
            .filter(|(score, _)| *score > RELEVANCE_FLOOR)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
    }

    /// Remove every memory row for a user.
    pub async fn clear_user(&self, user_id: &str) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM memories WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Human-readable digest of recent memories for the CLI.
    pub async fn summary(&self, user_id: &str) -> anyhow::Result<String> {
        let recent = self.recent(user_id, 10).await?;
        if recent.is_empty() {
            return Ok("No stored memories for this user.".to_string());
        }
        let mut lines = vec![format!("Recent memories for {user_id}:")];
        for entry in recent {
            let mut content = entry.content.replace('\n', " ");
            if content.chars().count() > 100 {
                content = content.chars().take(97).collect::<String>() + "...";
            }
            lines.push(format!("- {content}"));
        }
        Ok(lines.join("\n"))
    }

    /// Number of archived conversations for a user (observability).
    pub async fn conversation_count(&self, user_id: &str) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM conversations WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

fn entry_from_row(row: sqlx::sqlite::SqliteRow) -> anyhow::Result<MemoryEntry> {
    let created_at: String = row.try_get("created_at")?;
    Ok(MemoryEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
    })
}

#[async_trait]
impl ArchiveSink for MemoryStore {
    async fn archive(&self, conversation: ArchivedConversation) -> anyhow::Result<()> {
        let messages = serde_json::to_string(&conversation.messages)?;
        sqlx::query(
            "INSERT INTO conversations (user_id, started_at, ended_at, messages)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&conversation.user_id)
        .bind(conversation.started_at.map(|t| t.to_rfc3339()))
        .bind(conversation.ended_at.map(|t| t.to_rfc3339()))
        .bind(messages)
        .execute(&self.pool)
        .await?;
        debug!(
            user_id = %conversation.user_id,
            messages = conversation.messages.len(),
            "conversation archived"
        );
        Ok(())
    }
}

#[async_trait]
impl ContextStore for MemoryStore {
    async fn recall(&self, user_id: &str, query: &str) -> anyhow::Result<Option<String>> {
        let hits = self.search(user_id, query, 5).await?;
        if hits.is_empty() {
            return Ok(None);
        }
        let joined = hits
            .iter()
            .map(|e| format!("- {}", e.content))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Some(joined))
    }

    async fn remember(&self, user_id: &str, turn: &str, reply: &str) -> anyhow::Result<()> {
        self.add_memory(user_id, &format!("user: {turn}\nassistant: {reply}"))
            .await
    }
}
