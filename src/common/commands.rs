use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, oneshot};

use super::types::{BlockEvent, ChatMessage};
use crate::chat::MergeReport;
use crate::block::BlockOutcome;

/// Requests accepted by the history service.
#[derive(Debug)]
pub enum HistoryCommand {
    /// Reconcile a freshly fetched transcript with the cached one.
    Merge {
        batch: Vec<ChatMessage>,
        reply: oneshot::Sender<MergeReport>,
    },
    /// `say` messages of `username` no older than `after`.
    Query {
        username: String,
        after: DateTime<Utc>,
        reply: oneshot::Sender<Vec<ChatMessage>>,
    },
    Subscribe {
        reply: oneshot::Sender<broadcast::Receiver<ChatMessage>>,
    },
}

/// Requests accepted by the block service.
#[derive(Debug)]
pub enum BlockCommand {
    Block {
        event: BlockEvent,
        reply: Option<oneshot::Sender<BlockOutcome>>,
    },
    /// A user asked to be told about the next block.
    Register {
        username: String,
        channel: String,
        reply: oneshot::Sender<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} service is not running")]
    Stopped(&'static str),
}
