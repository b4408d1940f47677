use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cache store is poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Byte-oriented storage keyed by (account, key)
///
/// Implementations replace entries atomically: a reader sees either the old
/// blob or the new one, never a mix. There is no cross-process locking.
pub trait CacheStore: Send + Sync {
    /// Raw bytes of the entry, `None` when it does not exist
    fn read(&self, account: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Create or overwrite the entry
    fn write(&self, account: &str, key: &str, data: &[u8]) -> Result<()>;

    /// Time since the entry was last written, `None` when it does not exist
    fn age(&self, account: &str, key: &str) -> Result<Option<Duration>>;

    /// Drop the entry; removing a missing entry is not an error
    fn remove(&self, account: &str, key: &str) -> Result<()>;
}

/// Cache store backed by a single SQLite database
///
/// The `cached_at` column (milliseconds since the epoch) is the age oracle.
pub struct CacheManager {
    conn: Mutex<Connection>,
}

impl CacheManager {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // Initialize schema on first run
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Throwaway database, handy for tests and dry runs
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                account TEXT NOT NULL,
                key TEXT NOT NULL,
                data BLOB NOT NULL,
                cached_at INTEGER NOT NULL,
                PRIMARY KEY(account, key)
            )",
            [],
        )?;

        Ok(())
    }

    fn write_at(&self, account: &str, key: &str, data: &[u8], cached_at: i64) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        conn.execute(
            "INSERT INTO cache_entries (account, key, data, cached_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(account, key) DO UPDATE SET
                data = excluded.data,
                cached_at = excluded.cached_at",
            params![account, key, data, cached_at],
        )?;
        debug!("Stored {} bytes for {}/{}", data.len(), account, key);
        Ok(())
    }
}

impl CacheStore for CacheManager {
    fn read(&self, account: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let data = conn
            .query_row(
                "SELECT data FROM cache_entries WHERE account = ?1 AND key = ?2",
                params![account, key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }

    fn write(&self, account: &str, key: &str, data: &[u8]) -> Result<()> {
        self.write_at(account, key, data, Utc::now().timestamp_millis())
    }

    fn age(&self, account: &str, key: &str) -> Result<Option<Duration>> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let cached_at = conn
            .query_row(
                "SELECT cached_at FROM cache_entries WHERE account = ?1 AND key = ?2",
                params![account, key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        Ok(cached_at.map(|ts| {
            let elapsed = (Utc::now().timestamp_millis() - ts).max(0);
            Duration::from_millis(elapsed as u64)
        }))
    }

    fn remove(&self, account: &str, key: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        conn.execute(
            "DELETE FROM cache_entries WHERE account = ?1 AND key = ?2",
            params![account, key],
        )?;
        Ok(())
    }
}
