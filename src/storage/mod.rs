pub mod bot_db;
pub mod database;
pub mod memory;
pub mod sqlite;

pub use bot_db::BotDatabase;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;

use crate::common::{BlockInfo, ChatMessage};

/// Pending notifications as persisted: channel -> usernames in registration order.
pub type NotificationMap = IndexMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Persistence collaborator of the bot core.
///
/// Writes are treated as best-effort by every caller: a failed write is logged
/// and the in-memory state moves on regardless.
#[async_trait]
pub trait Store: Send + Sync {
    async fn latest_block(&self) -> Result<Option<BlockInfo>, StoreError>;

    /// Upsert keyed by height.
    async fn put_block(&self, block: &BlockInfo) -> Result<(), StoreError>;

    async fn block_notifications(&self) -> Result<NotificationMap, StoreError>;

    async fn put_block_notification(&self, username: &str, channel: &str)
    -> Result<(), StoreError>;

    async fn clear_block_notifications(&self) -> Result<(), StoreError>;

    /// Newest `limit` messages, oldest first.
    async fn last_messages(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError>;

    async fn put_msg(&self, msg: &ChatMessage) -> Result<(), StoreError>;
}

/// Ensure the directory holding `path` exists.
pub fn ensure_parent_dir<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
