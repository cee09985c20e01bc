use std::{path::PathBuf, time::Duration};

use {
    secrecy::Secret,
    serde::{Deserialize, Deserializer},
};

fn deserialize_secret_opt<'de, D>(deserializer: D) -> Result<Option<Secret<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(Secret::new))
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HuddleConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub wecom: WecomConfig,
    pub session: SessionConfig,
    pub scheduler: SchedulerConfig,
    pub delivery: DeliveryConfig,
    pub memory: MemoryConfig,
}

impl HuddleConfig {
    /// Names of required credential fields that are unset.
    ///
    /// The gateway can start without them (useful for local poking at
    /// `/status`), but nothing can reach the model or the platform, so
    /// startup logs each missing name.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.llm.api_key.is_none() {
            missing.push("llm.api_key");
        }
        if self.wecom.corp_id.is_empty() {
            missing.push("wecom.corp_id");
        }
        if self.wecom.corp_secret.is_none() {
            missing.push("wecom.corp_secret");
        }
        if self.wecom.agent_id == 0 {
            missing.push("wecom.agent_id");
        }
        missing
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "::" (dual-stack, v4-mapped).
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "::".into(),
            port: 8080,
        }
    }
}

/// Model backend (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_secret_opt")]
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Markdown file whose contents become the system persona prompt.
    pub persona_path: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".into(),
            api_key: None,
            model: "deepseek-chat".into(),
            temperature: 0.7,
            max_tokens: 4096,
            persona_path: None,
        }
    }
}

/// WeCom (WeChat Work) application credentials.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WecomConfig {
    pub corp_id: String,
    #[serde(deserialize_with = "deserialize_secret_opt")]
    pub corp_secret: Option<Secret<String>>,
    pub agent_id: i64,
    /// Callback token, reported by the check command; signature math happens
    /// in the fronting decryption layer.
    pub callback_token: Option<String>,
}

/// Session lifecycle knobs for the batching core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Seconds of quiet time after a user's last message before their queue
    /// is batched into one model turn.
    pub batch_timeout_secs: u64,
    /// Seconds of inactivity after which a conversation is declared over and
    /// the session is archived and removed.
    pub conversation_timeout_secs: u64,
    /// Upper bound on concurrently tracked sessions.
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            batch_timeout_secs: 40,
            conversation_timeout_secs: 3600,
            max_sessions: 10,
        }
    }
}

impl SessionConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn conversation_timeout(&self) -> Duration {
        Duration::from_secs(self.conversation_timeout_secs)
    }
}

/// Batch scheduler loop pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
    /// Sleep after an unexpected loop-level failure before polling again.
    pub error_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            error_backoff_secs: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

/// Outbound reply delivery pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Pause between consecutive reply segments so they arrive in order on
    /// the client.
    pub segment_delay_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            segment_delay_ms: 500,
        }
    }
}

impl DeliveryConfig {
    pub fn segment_delay(&self) -> Duration {
        Duration::from_millis(self.segment_delay_ms)
    }
}

/// Durable memory / archive store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// SQLite database path. Created on first use.
    pub db_path: PathBuf,
    /// Per-user cap on stored memory rows; oldest rows are evicted first.
    pub max_items_per_user: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/huddle.db"),
            max_items_per_user: 100,
        }
    }
}
