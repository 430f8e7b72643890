//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::ChannelError;

/// Stream of incoming messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// Kind of a room message, from the Matrix `msgtype` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Emote,
    /// Conventionally used for bot output.
    Notice,
    Other(String),
}

impl MessageType {
    pub fn parse(msgtype: &str) -> Self {
        match msgtype {
            "m.text" => Self::Text,
            "m.emote" => Self::Emote,
            "m.notice" => Self::Notice,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "m.text",
            Self::Emote => "m.emote",
            Self::Notice => "m.notice",
            Self::Other(s) => s,
        }
    }
}

/// A message received in a room.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Channel that produced the message.
    pub channel: String,
    pub room_id: String,
    pub event_id: String,
    pub sender: String,
    pub msgtype: MessageType,
    pub body: String,
    /// The event replaces an earlier message.
    pub is_edit: bool,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    /// Create a plain text message with fresh identifiers.
    pub fn new(
        channel: impl Into<String>,
        room_id: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            room_id: room_id.into(),
            event_id: format!("${}", uuid::Uuid::new_v4()),
            sender: sender.into(),
            msgtype: MessageType::Text,
            body: body.into(),
            is_edit: false,
            received_at: Utc::now(),
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    pub fn with_msgtype(mut self, msgtype: MessageType) -> Self {
        self.msgtype = msgtype;
        self
    }

    pub fn as_edit(mut self) -> Self {
        self.is_edit = true;
        self
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

/// A reply in both plain and rendered form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReply {
    /// Markdown source, used as the plain-text body.
    pub body: String,
    /// HTML rendering of `body`.
    pub formatted_body: String,
}

impl OutgoingReply {
    /// Build a reply from Markdown, rendering the HTML half.
    pub fn from_markdown(body: impl Into<String>) -> Self {
        let body = body.into();
        let formatted_body = crate::markdown::render(&body);
        Self {
            body,
            formatted_body,
        }
    }
}

/// A chat transport: delivers room messages and posts replies.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name for logging.
    fn name(&self) -> &str;

    /// Identity the channel posts as. Messages from it must be ignored.
    async fn own_user_id(&self) -> Result<String, ChannelError>;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Post a reply into the room `msg` came from.
    async fn respond(&self, msg: &IncomingMessage, reply: OutgoingReply)
    -> Result<(), ChannelError>;

    /// Verify the channel can reach its server.
    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
