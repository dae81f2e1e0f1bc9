use serde::Deserialize;

use super::types::{BlockEvent, ChatMessage};

/// One line of the newline-delimited JSON feed read by the binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedEvent {
    History {
        messages: Vec<ChatMessage>,
    },
    BlockCommand {
        username: String,
        channel: String,
    },
    Block(BlockEvent),
    Query {
        username: String,
        after: chrono::DateTime<chrono::Utc>,
    },
}
