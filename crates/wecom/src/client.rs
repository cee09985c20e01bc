use std::time::{Duration, Instant};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::{debug, info, warn},
};

use {huddle_config::WecomConfig, huddle_pipeline::Outbound};

use crate::error::{Context, Error, Result};

const DEFAULT_BASE_URL: &str = "https://qyapi.weixin.qq.com/cgi-bin";

/// Refresh the access token this long before the platform expires it.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Outbound WeCom application-message client with access-token caching.
pub struct WecomClient {
    http: reqwest::Client,
    base_url: String,
    corp_id: String,
    corp_secret: Secret<String>,
    agent_id: i64,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl WecomClient {
    pub fn from_config(config: &WecomConfig) -> Result<Self> {
        if config.corp_id.is_empty() {
            return Err(Error::MissingCredentials {
                missing: "wecom.corp_id",
            });
        }
        let Some(corp_secret) = config.corp_secret.clone() else {
            return Err(Error::MissingCredentials {
                missing: "wecom.corp_secret",
            });
        };
        if config.agent_id == 0 {
            return Err(Error::MissingCredentials {
                missing: "wecom.agent_id",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            corp_id: config.corp_id.clone(),
            corp_secret,
            agent_id: config.agent_id,
            token: tokio::sync::Mutex::new(None),
        })
    }

    /// Point the client at a different API host (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Cached access token, refreshed when within the expiry margin.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref()
            && t.expires_at > Instant::now()
        {
            debug!("using cached access token");
            return Ok(t.token.clone());
        }

        info!("fetching wecom access token");
        let response: TokenResponse = self
            .http
            .get(format!("{}/gettoken", self.base_url))
            .query(&[
                ("corpid", self.corp_id.as_str()),
                ("corpsecret", self.corp_secret.expose_secret().as_str()),
            ])
            .send()
            .await?
            .json()
            .await
            .context("decode gettoken response")?;

        if response.errcode != 0 {
            return Err(Error::Api {
                errcode: response.errcode,
                errmsg: response.errmsg,
            });
        }
        let token = response
            .access_token
            .context("gettoken response without access_token")?;

        let ttl = Duration::from_secs(response.expires_in.unwrap_or(7200));
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    /// Send one text message to a user via the application message API.
    pub async fn send_text(&self, user_id: &str, content: &str) -> Result<()> {
        let token = self.access_token().await?;
        debug!(user_id = %user_id, chars = content.len(), "sending wecom text message");

        let payload = serde_json::json!({
            "touser": user_id,
            "msgtype": "text",
            "agentid": self.agent_id,
            "text": { "content": content },
            "safe": 0,
        });

        let response: SendResponse = self
            .http
            .post(format!("{}/message/send", self.base_url))
            .query(&[("access_token", token.as_str())])
            .json(&payload)
            .send()
            .await?
            .json()
            .await
            .context("decode message/send response")?;

        if response.errcode != 0 {
            warn!(
                user_id = %user_id,
                errcode = response.errcode,
                errmsg = %response.errmsg,
                "wecom rejected the message"
            );
            // TODO: invalidate the cached token and retry once on errcode
            // 40014/42001 (expired token) instead of failing the segment.
            return Err(Error::Api {
                errcode: response.errcode,
                errmsg: response.errmsg,
            });
        }
        Ok(())
    }

    /// Verify credentials by fetching an access token.
    pub async fn probe(&self) -> Result<()> {
        self.access_token().await.map(|_| ())
    }
}

#[async_trait]
impl Outbound for WecomClient {
    async fn send_text(&self, user_id: &str, text: &str) -> anyhow::Result<()> {
        Ok(WecomClient::send_text(self, user_id, text).await?)
    }
}
