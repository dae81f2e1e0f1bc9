use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqlResult, Row, params};
use std::path::Path;

use super::NotificationMap;
use super::database::Database;
use crate::common::{BlockInfo, ChatMessage, MessageType};

/// Schema and queries backing the bot's persistent state.
pub struct BotDatabase {
    db: Database,
}

impl BotDatabase {
    pub fn with_path<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        Self::init(Database::new(path)?)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::init(Database::in_memory()?)
    }

    fn init(db: Database) -> SqlResult<Self> {
        let bot_db = Self { db };
        bot_db.init_schema()?;
        Ok(bot_db)
    }

    fn init_schema(&self) -> SqlResult<()> {
        let conn = self.db.connection();

        // A message has no id of its own; all five fields identify it.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                message TEXT NOT NULL,
                type TEXT NOT NULL,
                moderator INTEGER NOT NULL DEFAULT 0,
                date INTEGER NOT NULL,
                UNIQUE (username, message, type, moderator, date)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                height INTEGER PRIMARY KEY,
                hash TEXT NOT NULL,
                confirmation INTEGER NOT NULL,
                notification INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS block_notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                username TEXT NOT NULL,
                UNIQUE (channel, username)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_date ON chat_messages(date)",
            [],
        )?;

        Ok(())
    }

    // ========== Messages ==========

    /// Insert a message; storing the same message twice is a no-op.
    pub fn insert_message(&self, msg: &ChatMessage) -> SqlResult<()> {
        self.db.connection().execute(
            "INSERT OR IGNORE INTO chat_messages (username, message, type, moderator, date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                msg.username,
                msg.message,
                msg.kind.as_str(),
                msg.moderator,
                msg.millis()
            ],
        )?;
        Ok(())
    }

    /// Newest `limit` messages in chronological order.
    pub fn last_messages(&self, limit: usize) -> SqlResult<Vec<ChatMessage>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT username, message, type, moderator, date FROM (
                 SELECT id, username, message, type, moderator, date
                 FROM chat_messages
                 ORDER BY date DESC, id DESC
                 LIMIT ?1
             )
             ORDER BY date ASC, id ASC",
        )?;

        let messages = stmt
            .query_map(params![limit as i64], |row| {
                let kind: String = row.get(2)?;
                Ok(ChatMessage {
                    username: row.get(0)?,
                    message: row.get(1)?,
                    kind: MessageType::parse(&kind),
                    moderator: row.get(3)?,
                    date: millis_column(row, 4)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }

    // ========== Blocks ==========

    pub fn upsert_block(&self, block: &BlockInfo) -> SqlResult<()> {
        self.db.connection().execute(
            "INSERT OR REPLACE INTO blocks (height, hash, confirmation, notification)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                block.height as i64,
                block.hash,
                block.confirmation.timestamp_millis(),
                block.notification.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    pub fn latest_block(&self) -> SqlResult<Option<BlockInfo>> {
        let conn = self.db.connection();
        conn.query_row(
            "SELECT height, hash, confirmation, notification
             FROM blocks
             ORDER BY height DESC
             LIMIT 1",
            [],
            |row| {
                let height: i64 = row.get(0)?;
                Ok(BlockInfo {
                    height: height as u64,
                    hash: row.get(1)?,
                    confirmation: millis_column(row, 2)?,
                    notification: millis_column(row, 3)?,
                })
            },
        )
        .optional()
    }

    // ========== Block notifications ==========

    pub fn insert_block_notification(&self, username: &str, channel: &str) -> SqlResult<()> {
        self.db.connection().execute(
            "INSERT OR IGNORE INTO block_notifications (channel, username) VALUES (?1, ?2)",
            params![channel, username],
        )?;
        Ok(())
    }

    /// Pending notifications grouped per channel, in registration order.
    pub fn block_notifications(&self) -> SqlResult<NotificationMap> {
        let conn = self.db.connection();
        let mut stmt =
            conn.prepare("SELECT channel, username FROM block_notifications ORDER BY id ASC")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<SqlResult<Vec<_>>>()?;

        let mut map = NotificationMap::new();
        for (channel, username) in rows {
            map.entry(channel).or_default().push(username);
        }
        Ok(map)
    }

    pub fn clear_block_notifications(&self) -> SqlResult<()> {
        self.db
            .connection()
            .execute("DELETE FROM block_notifications", [])?;
        Ok(())
    }
}

fn millis_column(row: &Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}
