//! Matrix channel. Long-polls the client-server `/sync` API.
//!
//! Only `m.room.message` events from joined rooms are surfaced. Replies
//! go out as `m.notice` so other bots ignore them.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::channels::{Channel, IncomingMessage, MessageStream, MessageType, OutgoingReply};
use crate::config::MatrixConfig;
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "matrix";

/// Extra time allowed on top of the long-poll timeout before the HTTP
/// request itself is abandoned.
const SYNC_GRACE: Duration = Duration::from_secs(15);

/// Back-off after a failed sync.
const SYNC_RETRY_DELAY: Duration = Duration::from_secs(5);

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: Option<SyncRooms>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SyncRooms {
    #[serde(default)]
    pub join: HashMap<String, JoinedRoom>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct JoinedRoom {
    #[serde(default)]
    pub timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Timeline {
    #[serde(default)]
    pub events: Vec<RoomEvent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoomEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub origin_server_ts: Option<i64>,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl SyncResponse {
    /// Room messages in this batch, in timeline order per room.
    fn into_messages(self) -> Vec<IncomingMessage> {
        let Some(rooms) = self.rooms else {
            return Vec::new();
        };
        rooms
            .join
            .into_iter()
            .flat_map(|(room_id, room)| {
                room.timeline
                    .events
                    .into_iter()
                    .filter_map(move |event| parse_room_event(&room_id, &event))
            })
            .collect()
    }
}

/// Convert a timeline event into an incoming message.
///
/// Returns `None` for anything that is not a text-bearing `m.room.message`.
pub(crate) fn parse_room_event(room_id: &str, event: &RoomEvent) -> Option<IncomingMessage> {
    if event.event_type != "m.room.message" {
        return None;
    }
    let body = event.content.get("body")?.as_str()?;
    let msgtype = event.content.get("msgtype")?.as_str()?;

    let is_edit = event
        .content
        .get("m.relates_to")
        .and_then(|r| r.get("rel_type"))
        .and_then(|t| t.as_str())
        == Some("m.replace");

    let received_at: DateTime<Utc> = event
        .origin_server_ts
        .and_then(|ts| Utc.timestamp_millis_opt(ts).single())
        .unwrap_or_else(Utc::now);

    let mut msg = IncomingMessage::new(CHANNEL_NAME, room_id, event.sender.as_str(), body)
        .with_event_id(event.event_id.as_str())
        .with_msgtype(MessageType::parse(msgtype))
        .with_received_at(received_at);
    if is_edit {
        msg = msg.as_edit();
    }
    Some(msg)
}

// ── HTTP client ─────────────────────────────────────────────────────

/// Thin client-server API client, cheap to clone into the sync task.
#[derive(Clone)]
struct MatrixClient {
    http: reqwest::Client,
    homeserver: Url,
    access_token: SecretString,
}

impl MatrixClient {
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ChannelError> {
        let mut url = self.homeserver.clone();
        url.path_segments_mut()
            .map_err(|_| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("homeserver URL cannot be a base: {}", self.homeserver),
            })?
            .pop_if_empty()
            .extend(["_matrix", "client", "v3"])
            .extend(segments);
        Ok(url)
    }

    async fn whoami(&self) -> Result<String, ChannelError> {
        #[derive(Deserialize)]
        struct WhoAmI {
            user_id: String,
        }

        let resp = self
            .http
            .get(self.endpoint(&["account", "whoami"])?)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        let resp = check_status(resp, "whoami").await?;
        let who: WhoAmI = resp.json().await.map_err(|e| {
            ChannelError::InvalidMessage(format!("whoami response: {e}"))
        })?;
        Ok(who.user_id)
    }

    async fn sync(&self, since: Option<&str>, timeout: Duration) -> Result<SyncResponse, ChannelError> {
        let mut request = self
            .http
            .get(self.endpoint(&["sync"])?)
            .bearer_auth(self.access_token.expose_secret())
            .query(&[("timeout", timeout.as_millis().to_string())])
            .timeout(timeout + SYNC_GRACE);
        if let Some(since) = since {
            request = request.query(&[("since", since)]);
        }

        let resp = request.send().await.map_err(|e| ChannelError::StartupFailed {
            name: CHANNEL_NAME.into(),
            reason: format!("sync request failed: {e}"),
        })?;
        let resp = check_status(resp, "sync").await?;
        resp.json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(format!("sync response: {e}")))
    }

    async fn send_notice(&self, room_id: &str, reply: &OutgoingReply) -> Result<(), ChannelError> {
        let txn_id = uuid::Uuid::new_v4().to_string();
        let url = self.endpoint(&["rooms", room_id, "send", "m.room.message", &txn_id])?;
        let content = serde_json::json!({
            "msgtype": "m.notice",
            "body": reply.body,
            "format": "org.matrix.custom.html",
            "formatted_body": reply.formatted_body,
        });

        let resp = self
            .http
            .put(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&content)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("send returned {status}: {err}"),
            });
        }
        Ok(())
    }
}

async fn check_status(
    resp: reqwest::Response,
    operation: &str,
) -> Result<reqwest::Response, ChannelError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let err = resp.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ChannelError::AuthFailed {
            name: CHANNEL_NAME.into(),
            reason: format!("{operation} returned {status}: {err}"),
        });
    }
    Err(ChannelError::StartupFailed {
        name: CHANNEL_NAME.into(),
        reason: format!("{operation} returned {status}: {err}"),
    })
}

// ── Channel ─────────────────────────────────────────────────────────

/// Matrix channel, connected to a homeserver via `/sync` long-polling.
pub struct MatrixChannel {
    client: MatrixClient,
    sync_timeout: Duration,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl MatrixChannel {
    pub fn new(config: MatrixConfig) -> Result<Self, ChannelError> {
        let homeserver =
            Url::parse(&config.homeserver).map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("invalid homeserver URL '{}': {e}", config.homeserver),
            })?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("msc-resolver/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client: MatrixClient {
                http,
                homeserver,
                access_token: config.access_token,
            },
            sync_timeout: config.sync_timeout,
            sync_task: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Channel for MatrixChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn own_user_id(&self) -> Result<String, ChannelError> {
        self.client.whoami().await
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        // Skip the backlog: only events after this point are answered.
        let initial = self.client.sync(None, Duration::ZERO).await?;
        let mut since = initial.next_batch;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.client.clone();
        let sync_timeout = self.sync_timeout;

        let task = tokio::spawn(async move {
            tracing::info!("Matrix channel listening for messages...");

            loop {
                let batch = match client.sync(Some(&since), sync_timeout).await {
                    Ok(batch) => batch,
                    Err(e @ ChannelError::AuthFailed { .. }) => {
                        // Retrying cannot fix a rejected token.
                        tracing::error!("Matrix sync stopped: {e}");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!("Matrix sync error: {e}");
                        tokio::time::sleep(SYNC_RETRY_DELAY).await;
                        continue;
                    }
                };

                since = batch.next_batch.clone();
                for msg in batch.into_messages() {
                    if tx.send(msg).is_err() {
                        tracing::info!("Matrix listener channel closed");
                        return;
                    }
                }
            }
        });

        if let Some(previous) = self.sync_task.lock().await.replace(task) {
            previous.abort();
        }

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        reply: OutgoingReply,
    ) -> Result<(), ChannelError> {
        self.client.send_notice(&msg.room_id, &reply).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.client.whoami().await.map(|_| ())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Matrix channel shutting down");
        if let Some(task) = self.sync_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
