use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a chat line as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Say,
    Mute,
    #[serde(other)]
    Other,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Say => "say",
            MessageType::Mute => "mute",
            MessageType::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "say" => MessageType::Say,
            "mute" => MessageType::Mute,
            _ => MessageType::Other,
        }
    }
}

/// A single chat line. Never mutated after it has been stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub moderator: bool,
    pub date: DateTime<Utc>,
}

impl ChatMessage {
    /// Millisecond timestamp used for ordering and identity.
    pub fn millis(&self) -> i64 {
        self.date.timestamp_millis()
    }
}

// Sub-millisecond precision is not part of a message's identity.
impl PartialEq for ChatMessage {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
            && self.moderator == other.moderator
            && self.kind == other.kind
            && self.username == other.username
            && self.millis() == other.millis()
    }
}

impl Eq for ChatMessage {}

/// Latest block observed on the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub hash: String,
    /// When the block was mined, as reported by the chain.
    pub confirmation: DateTime<Utc>,
    /// When this process learned about it.
    pub notification: DateTime<Utc>,
}

impl BlockInfo {
    /// Placeholder used before any block has been seen.
    pub fn genesis(now: DateTime<Utc>) -> Self {
        Self {
            height: 0,
            hash: String::new(),
            confirmation: now,
            notification: now,
        }
    }
}

/// Raw block event as produced by a block source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub height: u64,
    pub hash: String,
    /// Block time in unix seconds.
    #[serde(rename = "time")]
    pub unix_time: i64,
}

impl BlockEvent {
    pub fn into_block_info(self, now: DateTime<Utc>) -> BlockInfo {
        let confirmation = Utc
            .timestamp_opt(self.unix_time, 0)
            .single()
            .unwrap_or(now);
        BlockInfo {
            height: self.height,
            hash: self.hash,
            confirmation,
            notification: now,
        }
    }
}

/// Line queued for delivery to a chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
}
