use std::fmt;
use std::path::Path;

use contracts::StateSnapshot;
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq)]
pub struct SaveRecord {
    pub game_id: String,
    pub tick: u64,
    pub snapshot: StateSnapshot,
    pub created_at: String,
}

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    NotAttached,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::NotAttached => write!(f, "save store is not attached"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

fn tick_stamp(tick: u64) -> String {
    format!("tick:{tick:08}")
}

/// External saver: consumes whole snapshots, never deltas.
#[derive(Debug)]
pub struct SqliteSaveStore {
    conn: Connection,
}

impl SqliteSaveStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS saves (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id TEXT NOT NULL,
                tick INTEGER NOT NULL,
                snapshot_json TEXT NOT NULL,
                created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_saves_game_tick ON saves (game_id, tick);",
        )?;
        Ok(())
    }

    pub fn save_snapshot(
        &mut self,
        game_id: &str,
        tick: u64,
        snapshot: &StateSnapshot,
    ) -> Result<(), PersistenceError> {
        let snapshot_json = serde_json::to_string(snapshot)?;
        self.conn.execute(
            "INSERT INTO saves (game_id, tick, snapshot_json, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                game_id,
                i64::try_from(tick).unwrap_or(i64::MAX),
                snapshot_json,
                tick_stamp(tick),
            ],
        )?;
        Ok(())
    }

    pub fn load_latest(&self, game_id: &str) -> Result<Option<SaveRecord>, PersistenceError> {
        let row = self
            .conn
            .query_row(
                "SELECT tick, snapshot_json, created_at FROM saves
                 WHERE game_id = ?1 ORDER BY id DESC LIMIT 1",
                params![game_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((tick, snapshot_json, created_at)) = row else {
            return Ok(None);
        };
        let snapshot: StateSnapshot = serde_json::from_str(&snapshot_json)?;
        Ok(Some(SaveRecord {
            game_id: game_id.to_string(),
            tick: u64::try_from(tick).unwrap_or(0),
            snapshot,
            created_at,
        }))
    }

    pub fn save_count(&self, game_id: &str) -> Result<u64, PersistenceError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM saves WHERE game_id = ?1",
            params![game_id],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
