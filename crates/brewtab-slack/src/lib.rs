//! Slack adapter.
//!
//! This crate implements the `brewtab-core` [`ChatPort`] over the Slack Web
//! API and serves the slash-command and interactivity endpoints.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

pub mod blocks;
pub mod payloads;
pub mod router;
pub mod signature;

use brewtab_core::{
    domain::{ChannelId, MessageRef, MessageTs, UserId},
    errors::Error,
    messaging::{
        port::ChatPort,
        types::{
            BotIdentity, ControlMessage, DirectoryUser, HistoryMessage, MessagingCapabilities,
        },
    },
    Result,
};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_SIZE: u32 = 200;
/// Slackbot is listed as a regular member; never treat it as a person.
const SLACKBOT_ID: &str = "USLACKBOT";

enum Body<'a> {
    Json(Value),
    Form(&'a [(&'a str, String)]),
}

#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Deserialize)]
struct AuthTest {
    user_id: String,
    #[serde(default)]
    bot_id: Option<String>,
}

#[derive(Deserialize)]
struct OpenedChannel {
    channel: IdOnly,
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize)]
struct Posted {
    channel: String,
    ts: String,
}

#[derive(Deserialize)]
struct History {
    #[serde(default)]
    messages: Vec<RawMessage>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Deserialize)]
struct RawMessage {
    ts: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
}

#[derive(Deserialize)]
struct Members {
    #[serde(default)]
    members: Vec<Member>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Deserialize)]
struct UserInfo {
    user: Member,
}

#[derive(Deserialize)]
struct Member {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: Profile,
}

#[derive(Default, Deserialize)]
struct Profile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

impl Member {
    /// Display name, then real name, then handle.
    fn best_name(&self) -> String {
        [
            self.profile.display_name.as_deref(),
            self.profile.real_name.as_deref(),
            self.real_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(&self.name)
        .to_string()
    }

    fn into_directory_user(self) -> DirectoryUser {
        let name = self.best_name();
        DirectoryUser {
            is_bot: self.is_bot || self.id == SLACKBOT_ID,
            id: UserId(self.id),
            name,
            deleted: self.deleted,
        }
    }
}

pub struct SlackMessenger {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl SlackMessenger {
    pub fn new(token: SecretString) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Call a Web API method once. Rate limiting (429) is reported as an
    /// error carrying Slack's `Retry-After`; spacing is `ThrottledChat`'s job.
    async fn call<T: DeserializeOwned>(&self, method: &str, body: Body<'_>) -> Result<T> {
        let url = format!("{}/{method}", self.base_url);
        let req = self
            .http
            .post(&url)
            .bearer_auth(self.token.expose_secret());
        let req = match body {
            Body::Json(v) => req.json(&v),
            Body::Form(pairs) => req.form(pairs),
        };

        let resp = req
            .send()
            .await
            .map_err(|e| Error::External(format!("slack {method} request error: {e}")))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("?")
                .to_string();
            tracing::warn!(method, retry_after = %retry_after, "slack rate limited");
            return Err(Error::External(format!(
                "slack {method} rate limited (retry after {retry_after}s)"
            )));
        }

        if !resp.status().is_success() {
            return Err(Error::External(format!(
                "slack {method} failed: {}",
                resp.status()
            )));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("slack {method} json error: {e}")))?;
        let envelope: Envelope = serde_json::from_value(value.clone())?;
        if !envelope.ok {
            return Err(Error::External(format!(
                "slack {method}: {}",
                envelope.error.as_deref().unwrap_or("unknown_error")
            )));
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl ChatPort for SlackMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 40_000,
        }
    }

    async fn bot_identity(&self) -> Result<BotIdentity> {
        let me: AuthTest = self.call("auth.test", Body::Json(json!({}))).await?;
        Ok(BotIdentity {
            user_id: UserId(me.user_id),
            bot_id: me.bot_id,
        })
    }

    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId> {
        let opened: OpenedChannel = self
            .call(
                "conversations.open",
                Body::Json(json!({ "users": user.as_str() })),
            )
            .await?;
        Ok(ChannelId(opened.channel.id))
    }

    async fn post_message(&self, channel: &ChannelId, msg: &ControlMessage) -> Result<MessageRef> {
        let posted: Posted = self
            .call(
                "chat.postMessage",
                Body::Json(json!({
                    "channel": channel.0,
                    "text": msg.fallback_text,
                    "blocks": blocks::control_blocks(msg),
                })),
            )
            .await?;
        Ok(MessageRef {
            channel: ChannelId(posted.channel),
            ts: MessageTs(posted.ts),
        })
    }

    async fn update_message(&self, target: &MessageRef, msg: &ControlMessage) -> Result<()> {
        let _: Value = self
            .call(
                "chat.update",
                Body::Json(json!({
                    "channel": target.channel.0,
                    "ts": target.ts.0,
                    "text": msg.fallback_text,
                    "blocks": blocks::control_blocks(msg),
                })),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, target: &MessageRef) -> Result<()> {
        let _: Value = self
            .call(
                "chat.delete",
                Body::Json(json!({ "channel": target.channel.0, "ts": target.ts.0 })),
            )
            .await?;
        Ok(())
    }

    async fn post_ephemeral(&self, channel: &ChannelId, user: &UserId, text: &str) -> Result<()> {
        let _: Value = self
            .call(
                "chat.postEphemeral",
                Body::Json(json!({
                    "channel": channel.0,
                    "user": user.as_str(),
                    "text": text,
                })),
            )
            .await?;
        Ok(())
    }

    async fn channel_history(&self, channel: &ChannelId) -> Result<Vec<HistoryMessage>> {
        let mut out = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut params = vec![
                ("channel", channel.0.clone()),
                ("limit", PAGE_SIZE.to_string()),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }
            let page: History = self
                .call("conversations.history", Body::Form(&params))
                .await?;
            out.extend(page.messages.into_iter().map(|m| HistoryMessage {
                ts: m.ts,
                user: m.user.map(UserId),
                bot_id: m.bot_id,
            }));

            cursor = page.response_metadata.next_cursor;
            if cursor.is_empty() {
                return Ok(out);
            }
        }
    }

    async fn list_users(&self) -> Result<Vec<DirectoryUser>> {
        let mut out = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut params = vec![("limit", PAGE_SIZE.to_string())];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }
            let page: Members = self.call("users.list", Body::Form(&params)).await?;
            out.extend(page.members.into_iter().map(Member::into_directory_user));

            cursor = page.response_metadata.next_cursor;
            if cursor.is_empty() {
                tracing::debug!(users = out.len(), "directory listed");
                return Ok(out);
            }
        }
    }

    async fn user_display_name(&self, user: &UserId) -> Result<String> {
        let params = [("user", user.0.clone())];
        let info: UserInfo = self.call("users.info", Body::Form(&params)).await?;
        Ok(info.user.best_name())
    }
}
