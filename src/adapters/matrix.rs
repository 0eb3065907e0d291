//! Matrix chat adapter.
//!
//! Speaks the client-server HTTP API directly: long-polled `/sync` for
//! inbound commands, `PUT .../send` for outbound messages. Messages from the
//! bot's own user and from other rooms are filtered out before delivery.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ChatSender;

const SYNC_TIMEOUT_MS: u64 = 30_000;

/// An inbound chat message after room/self filtering.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender: String,
    pub body: String,
    pub room: String,
}

/// Matrix client bound to one room.
pub struct MatrixClient {
    homeserver: String,
    token: String,
    room_id: String,
    user_id: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    next_batch: String,
    #[serde(default)]
    rooms: SyncRooms,
}

#[derive(Debug, Default, Deserialize)]
struct SyncRooms {
    #[serde(default)]
    join: HashMap<String, JoinedRoom>,
}

#[derive(Debug, Deserialize)]
struct JoinedRoom {
    #[serde(default)]
    timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
struct Timeline {
    #[serde(default)]
    events: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
    user_id: String,
}

impl MatrixClient {
    pub fn new(
        homeserver: impl Into<String>,
        token: impl Into<String>,
        room_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        let homeserver = homeserver.into().trim_end_matches('/').to_string();
        Self {
            homeserver,
            token: token.into(),
            room_id: room_id.into(),
            user_id,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/_matrix/client/v3/{}", self.homeserver, path)
    }

    /// Resolve our own user id so the sync loop can skip our messages.
    async fn whoami(&self) -> Result<String> {
        let response = self
            .client
            .get(self.api_url("account/whoami"))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to call whoami")?
            .error_for_status()
            .context("whoami rejected")?;

        let whoami: WhoamiResponse = response.json().await.context("Bad whoami response")?;
        Ok(whoami.user_id)
    }

    /// Join the configured room (idempotent server-side).
    pub async fn join_room(&self) -> Result<()> {
        let path = format!("join/{}", urlencode(&self.room_id));
        self.client
            .post(self.api_url(&path))
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()
            .await
            .context("Failed to join room")?
            .error_for_status()
            .context("Room join rejected")?;
        Ok(())
    }

    /// One sync round; returns the next batch token and any text messages
    /// from the configured room.
    async fn sync_once(
        &self,
        since: Option<&str>,
        own_user: &str,
    ) -> Result<(String, Vec<InboundMessage>)> {
        let mut url = format!(
            "{}?timeout={}",
            self.api_url("sync"),
            SYNC_TIMEOUT_MS
        );
        if let Some(token) = since {
            url.push_str(&format!("&since={}", urlencode(token)));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .timeout(Duration::from_millis(SYNC_TIMEOUT_MS + 15_000))
            .send()
            .await
            .context("Sync request failed")?
            .error_for_status()
            .context("Sync rejected")?;

        let sync: SyncResponse = response.json().await.context("Bad sync response")?;

        let mut messages = Vec::new();
        for (room_id, room) in &sync.rooms.join {
            if *room_id != self.room_id {
                continue;
            }
            for event in &room.timeline.events {
                if event["type"].as_str() != Some("m.room.message") {
                    continue;
                }
                if event["content"]["msgtype"].as_str() != Some("m.text") {
                    continue;
                }
                let sender = event["sender"].as_str().unwrap_or_default();
                if sender.is_empty() || sender == own_user {
                    continue;
                }
                let Some(body) = event["content"]["body"].as_str() else {
                    continue;
                };
                messages.push(InboundMessage {
                    sender: sender.to_string(),
                    body: body.to_string(),
                    room: room_id.clone(),
                });
            }
        }

        Ok((sync.next_batch, messages))
    }

    /// Long-poll sync forever, pushing inbound messages onto `tx`.
    ///
    /// The first sync only establishes the batch token, so commands sent
    /// while the bot was down are not replayed.
    pub async fn listen(&self, tx: mpsc::Sender<InboundMessage>) {
        let own_user = match &self.user_id {
            Some(id) => id.clone(),
            None => match self.whoami().await {
                Ok(id) => id,
                Err(e) => {
                    error!(error = %e, "Could not resolve own user id; listener disabled");
                    return;
                }
            },
        };

        if let Err(e) = self.join_room().await {
            warn!(error = %e, room = %self.room_id, "Room join failed, listening anyway");
        }

        let mut since: Option<String> = None;
        let mut first = true;
        info!(room = %self.room_id, "Matrix listener active");

        loop {
            match self.sync_once(since.as_deref(), &own_user).await {
                Ok((next_batch, messages)) => {
                    if !first {
                        for message in messages {
                            debug!(sender = %message.sender, "Inbound chat message");
                            if tx.send(message).await.is_err() {
                                return;
                            }
                        }
                    }
                    since = Some(next_batch);
                    first = false;
                }
                Err(e) => {
                    warn!(error = %e, "Sync loop error, retrying");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}

#[async_trait]
impl ChatSender for MatrixClient {
    async fn send(&self, text: &str, html: Option<&str>) -> Result<()> {
        let mut content = json!({
            "msgtype": "m.text",
            "body": text,
        });
        if let Some(html) = html {
            content["format"] = json!("org.matrix.custom.html");
            content["formatted_body"] = json!(html);
        }

        let path = format!(
            "rooms/{}/send/m.room.message/{}",
            urlencode(&self.room_id),
            Uuid::new_v4()
        );
        self.client
            .put(self.api_url(&path))
            .bearer_auth(&self.token)
            .json(&content)
            .send()
            .await
            .context("Failed to send chat message")?
            .error_for_status()
            .context("Chat message rejected")?;

        Ok(())
    }

    fn is_configured(&self) -> bool {
        !self.homeserver.is_empty() && !self.token.is_empty() && !self.room_id.is_empty()
    }
}

/// Chat stand-in when Matrix is not configured; sends go nowhere.
pub struct DisabledChat;

#[async_trait]
impl ChatSender for DisabledChat {
    async fn send(&self, _text: &str, _html: Option<&str>) -> Result<()> {
        Ok(())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Percent-encode a path component (room ids contain `!` and `:`).
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
