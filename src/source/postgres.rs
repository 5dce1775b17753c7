// ABOUTME: PostgreSQL-backed attendance log store
// ABOUTME: Connects over TLS when the server offers it and reads with bound parameters

use anyhow::{Context, Result};
use async_trait::async_trait;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

use super::{Dialect, EventQuery, EventStore, RawEvent};
use crate::utils::sanitize_connection_string;

/// Device logs kept in PostgreSQL. `LogDate` must be a `timestamp` column.
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let connector = native_tls::TlsConnector::builder()
            .build()
            .context("Failed to build TLS connector")?;
        let tls = MakeTlsConnector::new(connector);

        let (client, connection) = tokio_postgres::connect(url, tls)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to {}",
                    sanitize_connection_string(url)
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventStore for PostgresStore {
    async fn fetch(&mut self, query: &EventQuery) -> Result<Vec<RawEvent>> {
        let sql = query.to_sql(Dialect::Postgres);
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&query.day];
        if let Some(after) = query.after.as_ref() {
            params.push(after);
        }

        let rows = self
            .client
            .query(sql.as_str(), &params)
            .await
            .context("Failed to query device logs")?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            events.push(RawEvent {
                source_id: row
                    .try_get::<_, Option<String>>(0)?
                    .unwrap_or_default(),
                employee_code: row
                    .try_get::<_, Option<String>>(1)?
                    .unwrap_or_default(),
                log_timestamp: row
                    .try_get(2)
                    .context("LogDate must be a timestamp without time zone")?,
                direction: row
                    .try_get::<_, Option<String>>(3)?
                    .unwrap_or_default(),
            });
        }

        tracing::debug!("Read {} device log rows from PostgreSQL", events.len());
        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        !self.client.is_closed()
    }
}
