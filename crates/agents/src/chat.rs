use std::time::Duration;

use {
    async_trait::async_trait,
    chrono::Local,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

use {
    huddle_config::LlmConfig,
    huddle_pipeline::{ModelBackend, ModelReply, ModelTurn, SILENT_SENTINEL},
};

/// Hard cap on a single model call so a stuck upstream cannot pin a session
/// in the processing state indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI-compatible chat-completions client.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Secret<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    persona: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatClient {
    pub fn from_config(config: &LlmConfig, persona: Option<String>) -> anyhow::Result<Self> {
        let Some(api_key) = config.api_key.clone() else {
            anyhow::bail!("llm.api_key is not configured");
        };
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            persona,
        })
    }

    fn build_messages(&self, turn: &ModelTurn) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(4);

        if let Some(persona) = &self.persona {
            messages.push(ChatMessage {
                role: "system",
                content: persona.clone(),
            });
        }

        let clock = Local::now().format("%Y-%m-%d %H:%M:%S");
        messages.push(ChatMessage {
            role: "system",
            content: format!("<time>{clock} CST <channel>wecom <user_id>{}", turn.user_id),
        });

        if let Some(context) = &turn.context {
            messages.push(ChatMessage {
                role: "system",
                content: format!("Relevant context from earlier conversations:\n{context}"),
            });
        }

        messages.push(ChatMessage {
            role: "user",
            content: turn.text.clone(),
        });
        messages
    }
}

#[async_trait]
impl ModelBackend for ChatClient {
    async fn generate(&self, turn: ModelTurn) -> anyhow::Result<ModelReply> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: self.build_messages(&turn),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        info!(
            user_id = %turn.user_id,
            model = %self.model,
            turn_chars = turn.text.len(),
            "calling chat completions"
        );

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let trimmed = content.trim();
        if trimmed.is_empty() || trimmed == SILENT_SENTINEL {
            debug!(user_id = %turn.user_id, "model returned silence");
            return Ok(ModelReply::Silent);
        }

        debug!(user_id = %turn.user_id, reply_chars = trimmed.len(), "model replied");
        Ok(ModelReply::Text(content))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> ChatClient {
        let config = LlmConfig {
            base_url: server.url(),
            api_key: Some(Secret::new("sk-test".to_string())),
            model: "deepseek-chat".into(),
            ..LlmConfig::default()
        };
        ChatClient::from_config(&config, Some("You are a helpful bot.".into())).unwrap()
    }

    fn turn(text: &str) -> ModelTurn {
        ModelTurn {
            user_id: "u1".into(),
            text: text.into(),
            context: None,
        }
    }

    fn reply_body(content: &str) -> String {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn returns_reply_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_body(reply_body("hello there"))
            .create_async()
            .await;

        let reply = client_for(&server).generate(turn("hi")).await.unwrap();
        assert_eq!(reply, ModelReply::Text("hello there".into()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn maps_sentinel_to_silent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(reply_body("  [SILENT]  "))
            .create_async()
            .await;

        let reply = client_for(&server).generate(turn("ok thanks")).await.unwrap();
        assert_eq!(reply, ModelReply::Silent);
    }

    #[tokio::test]
    async fn missing_content_is_silent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
            .create_async()
            .await;

        let reply = client_for(&server).generate(turn("hi")).await.unwrap();
        assert_eq!(reply, ModelReply::Silent);
    }

    #[tokio::test]
    async fn upstream_error_status_fails_the_call() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        assert!(client_for(&server).generate(turn("hi")).await.is_err());
    }

    #[tokio::test]
    async fn request_carries_persona_header_and_user_turn() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_request(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body().unwrap()).unwrap();
                let messages = body["messages"].as_array().unwrap();
                messages.len() == 3
                    && messages[0]["role"] == "system"
                    && messages[0]["content"] == "You are a helpful bot."
                    && messages[1]["content"]
                        .as_str()
                        .unwrap()
                        .contains("<channel>wecom <user_id>u1")
                    && messages[2]["role"] == "user"
                    && messages[2]["content"] == "[09:00:00] hi"
            })
            .with_status(200)
            .with_body(reply_body("hey"))
            .create_async()
            .await;

        client_for(&server)
            .generate(turn("[09:00:00] hi"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let config = LlmConfig::default();
        assert!(ChatClient::from_config(&config, None).is_err());
    }
}
