use {
    huddle_common::types::MessageKind,
    huddle_sessions::Message,
    serde::Deserialize,
};

use crate::error::Result;

/// Decrypted WeCom callback envelope, one per webhook POST.
///
/// Fields the platform sends that we never use (AgentID, media descriptors,
/// location payloads) are ignored on parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackEnvelope {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub msg_id: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
}

impl CallbackEnvelope {
    /// Parse the decrypted callback XML body.
    pub fn parse(xml: &str) -> Result<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    /// The platform message id, or a synthesized `{create_time}_{sender}`
    /// when the platform omitted one.
    pub fn message_id(&self) -> String {
        match &self.msg_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("{}_{}", self.create_time, self.from_user_name),
        }
    }

    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::parse(&self.msg_type)
    }

    pub fn is_event(&self) -> bool {
        self.msg_type == "event"
    }

    /// Convert into a session [`Message`], stamped with the arrival wall
    /// clock (quiet periods are measured against our clock, not the
    /// platform's). Only actionable text with non-blank content converts;
    /// events and media kinds yield `None`.
    pub fn into_message(self) -> Option<Message> {
        if !self.kind()?.is_text() {
            return None;
        }
        let content = self.content.as_deref().unwrap_or("").trim();
        if content.is_empty() {
            return None;
        }
        let id = self.message_id();
        Some(Message::text(id, self.from_user_name, content))
    }
}
