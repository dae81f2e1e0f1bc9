use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{BotDatabase, NotificationMap, Store, StoreError, ensure_parent_dir};
use crate::common::{BlockInfo, ChatMessage};

/// [`Store`] backed by a single SQLite connection.
///
/// Queries run on tokio's blocking pool so the services never stall a worker
/// thread on disk I/O.
pub struct SqliteStore {
    db: Arc<Mutex<BotDatabase>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        ensure_parent_dir(path).map_err(|err| StoreError::Rejected(err.to_string()))?;
        log::info!("Opening chat database at {}", path.display());
        Ok(Self::from_db(BotDatabase::with_path(path)?))
    }

    pub fn from_db(db: BotDatabase) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    async fn with_db<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&BotDatabase) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let db = db.lock().map_err(|_| StoreError::Poisoned)?;
            Ok(query(&db)?)
        })
        .await?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn latest_block(&self) -> Result<Option<BlockInfo>, StoreError> {
        self.with_db(|db| db.latest_block()).await
    }

    async fn put_block(&self, block: &BlockInfo) -> Result<(), StoreError> {
        let block = block.clone();
        self.with_db(move |db| db.upsert_block(&block)).await
    }

    async fn block_notifications(&self) -> Result<NotificationMap, StoreError> {
        self.with_db(|db| db.block_notifications()).await
    }

    async fn put_block_notification(
        &self,
        username: &str,
        channel: &str,
    ) -> Result<(), StoreError> {
        let (username, channel) = (username.to_string(), channel.to_string());
        self.with_db(move |db| db.insert_block_notification(&username, &channel))
            .await
    }

    async fn clear_block_notifications(&self) -> Result<(), StoreError> {
        self.with_db(|db| db.clear_block_notifications()).await
    }

    async fn last_messages(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        self.with_db(move |db| db.last_messages(limit)).await
    }

    async fn put_msg(&self, msg: &ChatMessage) -> Result<(), StoreError> {
        let msg = msg.clone();
        self.with_db(move |db| db.insert_message(&msg)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MessageType;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bot.db");

        let msg = ChatMessage {
            username: "carol".into(),
            message: "gg".into(),
            kind: MessageType::Say,
            moderator: true,
            date: Utc.timestamp_millis_opt(1_650_000_000_500).unwrap(),
        };

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put_msg(&msg).await.unwrap();
            store.put_block_notification("carol", "english").await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.last_messages(10).await.unwrap(), vec![msg]);
        assert_eq!(
            store.block_notifications().await.unwrap()["english"],
            vec!["carol".to_string()]
        );
    }

    #[tokio::test]
    async fn block_and_notification_round_trip_in_memory() {
        let store = SqliteStore::from_db(BotDatabase::in_memory().unwrap());
        assert!(store.latest_block().await.unwrap().is_none());

        let block = BlockInfo {
            height: 815_000,
            hash: "0000beef".into(),
            confirmation: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            notification: Utc.timestamp_opt(1_700_000_030, 0).unwrap(),
        };
        store.put_block(&block).await.unwrap();
        store.put_block_notification("dan", "english").await.unwrap();
        store.put_block_notification("eve", "english").await.unwrap();

        assert_eq!(store.latest_block().await.unwrap(), Some(block));
        assert_eq!(
            store.block_notifications().await.unwrap()["english"],
            vec!["dan", "eve"]
        );

        store.clear_block_notifications().await.unwrap();
        assert!(store.block_notifications().await.unwrap().is_empty());
    }
}
