// ABOUTME: Incremental reader for device attendance logs
// ABOUTME: Builds the checkpoint-driven query against the current monthly partition

pub mod postgres;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::checkpoint::Checkpoint;
use crate::error::SyncError;
use crate::utils::{quote_ident, sanitize_connection_string};

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// Logs are partitioned per month into `DeviceLogs_<month>_<year>`.
pub const PARTITION_PREFIX: &str = "DeviceLogs";
pub const EMPLOYEES_TABLE: &str = "Employees";

/// One device log row joined with its employee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// `DeviceLogId`, the surrogate key rows are ordered by
    pub source_id: String,
    pub employee_code: String,
    pub log_timestamp: NaiveDateTime,
    /// Usually `in`/`out`, but any value is carried through
    pub direction: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

/// Name of the partition holding logs for `date`, e.g. `DeviceLogs_3_2024`.
pub fn partition_name(date: NaiveDate) -> String {
    format!("{}_{}_{}", PARTITION_PREFIX, date.month(), date.year())
}

/// What one tick asks the store for: all of `day`'s logs, optionally only
/// those strictly after `after`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub partition: String,
    pub day: NaiveDate,
    pub after: Option<NaiveDateTime>,
}

impl EventQuery {
    pub fn new(now: NaiveDateTime, after: Option<NaiveDateTime>) -> Self {
        let day = now.date();
        Self {
            partition: partition_name(day),
            day,
            after,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.after.is_some()
    }

    /// Render the statement. `day` binds to the first parameter and `after`,
    /// when present, to the second.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let logs = quote_ident(&self.partition);
        let employees = quote_ident(EMPLOYEES_TABLE);
        let (day_expr, day_param, after_clause) = match dialect {
            Dialect::Sqlite => (
                format!("date(l.{})", quote_ident("LogDate")),
                "?1",
                format!(
                    "julianday(l.{}) > julianday(?2)",
                    quote_ident("LogDate")
                ),
            ),
            Dialect::Postgres => (
                format!("CAST(l.{} AS DATE)", quote_ident("LogDate")),
                "$1",
                format!("l.{} > $2", quote_ident("LogDate")),
            ),
        };

        let mut sql = format!(
            "SELECT CAST(l.{id} AS TEXT), CAST(e.{code} AS TEXT), l.{date}, CAST(l.{dir} AS TEXT) \
             FROM {logs} AS l \
             JOIN {employees} AS e ON l.{user} = e.{emp} \
             WHERE {day_expr} = {day_param}",
            id = quote_ident("DeviceLogId"),
            code = quote_ident("EmployeeCode"),
            date = quote_ident("LogDate"),
            dir = quote_ident("Direction"),
            user = quote_ident("UserId"),
            emp = quote_ident("EmployeeId"),
            logs = logs,
            employees = employees,
            day_expr = day_expr,
            day_param = day_param,
        );
        if self.after.is_some() {
            sql.push_str(" AND ");
            sql.push_str(&after_clause);
        }
        sql.push_str(&format!(" ORDER BY l.{}", quote_ident("DeviceLogId")));
        sql
    }
}

impl fmt::Display for EventQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.after {
            Some(after) => write!(f, "{} on {} after {}", self.partition, self.day, after),
            None => write!(f, "{} on {}", self.partition, self.day),
        }
    }
}

/// A data store that can answer an [`EventQuery`].
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Rows matching `query`, ascending by source id.
    async fn fetch(&mut self, query: &EventQuery) -> Result<Vec<RawEvent>>;

    /// Whether the handle is still usable after an error. Unusable handles are
    /// dropped and reopened on the next fetch.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Backend chosen from a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Postgres(String),
    Sqlite(std::path::PathBuf),
}

impl StoreTarget {
    /// `postgres://` and `postgresql://` select PostgreSQL; `sqlite:<path>`
    /// or a bare file path selects SQLite.
    pub fn parse(connection: &str) -> Result<Self> {
        let connection = connection.trim();
        if connection.is_empty() {
            bail!("ConnectionString is empty");
        }
        if connection.starts_with("postgres://") || connection.starts_with("postgresql://") {
            return Ok(StoreTarget::Postgres(connection.to_string()));
        }
        if let Some(path) = connection
            .strip_prefix("sqlite://")
            .or_else(|| connection.strip_prefix("sqlite:"))
        {
            if path.is_empty() {
                bail!("sqlite connection string has no path");
            }
            return Ok(StoreTarget::Sqlite(path.into()));
        }
        if connection.contains('=') && connection.contains(';') {
            bail!(
                "unsupported connection string {:?}: expected postgres://... or a SQLite path",
                sanitize_connection_string(connection)
            );
        }
        Ok(StoreTarget::Sqlite(connection.into()))
    }

    pub async fn open(&self) -> Result<Box<dyn EventStore>> {
        match self {
            StoreTarget::Postgres(url) => Ok(Box::new(PostgresStore::connect(url).await?)),
            StoreTarget::Sqlite(path) => Ok(Box::new(SqliteStore::open(path)?)),
        }
    }
}

pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Runs the incremental query for each tick.
///
/// The store handle is opened lazily, dropped when it becomes unusable and
/// released on shutdown.
pub struct SourceReader {
    connection_string: String,
    store: Option<Box<dyn EventStore>>,
    clock: Clock,
}

impl SourceReader {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            store: None,
            clock: Arc::new(local_now),
        }
    }

    /// Reader over an already open store.
    pub fn with_store(store: Box<dyn EventStore>) -> Self {
        Self {
            connection_string: String::new(),
            store: Some(store),
            clock: Arc::new(local_now),
        }
    }

    /// Replace the wall clock used to pick the day and partition.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    /// Build the next query. The partition is recomputed from the clock on
    /// every call so a month rollover is picked up mid-run.
    pub fn build_query(&self, checkpoint: &mut Checkpoint) -> EventQuery {
        EventQuery::new((self.clock)(), checkpoint.take_lower_bound())
    }

    /// Fetch the rows for the next tick. The checkpoint itself is never moved
    /// here, only its first-run gate.
    pub async fn fetch(&mut self, checkpoint: &mut Checkpoint) -> Result<Vec<RawEvent>, SyncError> {
        let query = self.build_query(checkpoint);
        tracing::debug!("Querying {}", query);

        if self.store.is_none() {
            let target = StoreTarget::parse(&self.connection_string).map_err(SyncError::Source)?;
            let store = target.open().await.map_err(SyncError::Source)?;
            tracing::info!(
                "Opened attendance store {}",
                sanitize_connection_string(&self.connection_string)
            );
            self.store = Some(store);
        }

        let Some(store) = self.store.as_mut() else {
            return Err(SyncError::Source(anyhow::anyhow!("store is not open")));
        };

        match store.fetch(&query).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                if !store.is_healthy() {
                    tracing::warn!("Dropping unusable store connection");
                    self.store = None;
                }
                Err(SyncError::Source(e.context(format!("Failed to query {}", query))))
            }
        }
    }

    /// Drop the store handle.
    pub fn release(&mut self) {
        if self.store.take().is_some() {
            tracing::info!("Released attendance store connection");
        }
    }
}
