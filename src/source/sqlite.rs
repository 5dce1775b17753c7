// ABOUTME: SQLite-backed attendance log store
// ABOUTME: Queries run on the blocking pool since rusqlite is synchronous

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OpenFlags, ToSql};

use super::{Dialect, EventQuery, EventStore, RawEvent};

/// Device logs kept in a SQLite file.
///
/// `LogDate` is expected as ISO-8601 text (`YYYY-MM-DD HH:MM:SS[.fff]`).
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open an existing database file read-only.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("SQLite database {} does not exist", path.display());
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn fetch(&mut self, query: &EventQuery) -> Result<Vec<RawEvent>> {
        let conn = Arc::clone(&self.conn);
        let sql = query.to_sql(Dialect::Sqlite);
        let day = query.day;
        let after = query.after;

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| anyhow!("SQLite connection lock poisoned"))?;
            read_events(&conn, &sql, day, after)
        })
        .await
        .context("SQLite query task failed")?
    }
}

fn read_events(
    conn: &Connection,
    sql: &str,
    day: NaiveDate,
    after: Option<NaiveDateTime>,
) -> Result<Vec<RawEvent>> {
    let mut stmt = conn
        .prepare(sql)
        .context("Failed to prepare device log query")?;

    let mut params: Vec<&dyn ToSql> = vec![&day];
    if let Some(after) = after.as_ref() {
        params.push(after);
    }

    let events = stmt
        .query_map(params.as_slice(), |row| {
            Ok(RawEvent {
                source_id: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                employee_code: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                log_timestamp: row.get(2)?,
                direction: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })
        .context("Failed to query device logs")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read device log rows")?;

    tracing::debug!("Read {} device log rows from SQLite", events.len());
    Ok(events)
}
