//! Discord REST adapter (v10), limited to the guild channel operations the
//! reconciler uses. No gateway session is opened.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::platform::{ChannelKind, ChannelPlatform, PlatformChannel};
use crate::error::{Result, StatBotError};

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// CONNECT permission bit
const PERMISSION_CONNECT: u64 = 1 << 20;

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    base_url: String,
    guild_id: String,
    category_id: Option<String>,
    lock_channels: bool,
}

impl DiscordClient {
    pub fn new(
        base_url: Option<&str>,
        token: &str,
        guild_id: &str,
        category_id: Option<String>,
        lock_channels: bool,
    ) -> Result<Self> {
        let base_url = base_url
            .unwrap_or(DEFAULT_DISCORD_API_BASE)
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|e| StatBotError::Validation(format!("invalid Discord token header: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .user_agent(concat!(
                "DiscordBot (https://github.com/statbot/statbot, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                StatBotError::Internal(format!("failed to build Discord HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url,
            guild_id: guild_id.to_string(),
            category_id,
            lock_channels,
        })
    }

    /// Request body for channel creation
    fn create_body(&self, name: &str, kind: ChannelKind) -> Value {
        let mut body = json!({
            "name": name,
            "type": kind.code(),
        });
        if let Some(parent) = &self.category_id {
            body["parent_id"] = json!(parent);
        }
        if self.lock_channels && kind == ChannelKind::Voice {
            // The @everyone role shares the guild's id
            body["permission_overwrites"] = json!([{
                "id": self.guild_id,
                "type": 0,
                "deny": PERMISSION_CONNECT.to_string(),
            }]);
        }
        body
    }

    async fn request_json(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if status.as_u16() == 429 {
            let retry_after = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("retry_after").and_then(Value::as_f64));
            warn!(?retry_after, "Discord rate limited {} {}", method, path);
            return Err(StatBotError::RateLimited(format!(
                "Discord {} {} (retry after {:?}s)",
                method, path, retry_after
            )));
        }

        if !status.is_success() {
            return Err(StatBotError::Platform(format!(
                "Discord {} {} failed: status={} body={}",
                method, path, status, text
            )));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ChannelPlatform for DiscordClient {
    async fn create_channel(&self, name: &str, kind: ChannelKind) -> Result<String> {
        let path = format!("/guilds/{}/channels", self.guild_id);
        let value = self
            .request_json(Method::POST, &path, Some(self.create_body(name, kind)))
            .await?;
        let channel: ChannelResponse = serde_json::from_value(value)?;
        debug!(channel_id = %channel.id, "Created channel '{}'", name);
        Ok(channel.id)
    }

    async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<()> {
        let path = format!("/channels/{}", channel_id);
        self.request_json(Method::PATCH, &path, Some(json!({ "name": name })))
            .await?;
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<PlatformChannel>> {
        let path = format!("/guilds/{}/channels", self.guild_id);
        let value = self.request_json(Method::GET, &path, None).await?;
        let channels: Vec<ChannelResponse> = serde_json::from_value(value)?;
        Ok(channels
            .into_iter()
            .map(|c| PlatformChannel {
                id: c.id,
                name: c.name.unwrap_or_default(),
                kind: ChannelKind::from_code(c.kind),
            })
            .collect())
    }

    async fn set_nickname(&self, nickname: &str) -> Result<()> {
        let path = format!("/guilds/{}/members/@me", self.guild_id);
        self.request_json(Method::PATCH, &path, Some(json!({ "nick": nickname })))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(category: Option<&str>, lock: bool) -> DiscordClient {
        DiscordClient::new(None, "token", "4242", category.map(String::from), lock).unwrap()
    }

    #[test]
    fn test_create_body_locks_voice_channels() {
        let body = client(Some("77"), true).create_body("BTC: loading", ChannelKind::Voice);
        assert_eq!(body["type"], 2);
        assert_eq!(body["parent_id"], "77");
        assert_eq!(body["permission_overwrites"][0]["id"], "4242");
        assert_eq!(body["permission_overwrites"][0]["deny"], "1048576");
    }

    #[test]
    fn test_create_body_without_lock_or_category() {
        let body = client(None, false).create_body("Floor: loading", ChannelKind::Voice);
        assert!(body.get("parent_id").is_none());
        assert!(body.get("permission_overwrites").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            DiscordClient::new(Some("http://localhost:9000/api/"), "t", "1", None, true).unwrap();
        assert_eq!(client.base_url, "http://localhost:9000/api");
    }

    #[test]
    fn test_channel_kind_codes() {
        for kind in [ChannelKind::Text, ChannelKind::Voice, ChannelKind::Category] {
            assert_eq!(ChannelKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ChannelKind::from_code(13), None);
    }
}
