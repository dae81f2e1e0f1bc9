use rusqlite::{Connection, Result as SqlResult};
use std::path::Path;

/// Owned SQLite connection with the pragmas the bot relies on.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        // WAL keeps readers from blocking the single writer.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::configure(conn)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> SqlResult<Self> {
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
