use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use crate::db::{
    helpers::{format_timestamp, parse_timestamp, to_i64},
    Database, StoreResult,
};
use crate::models::Reading;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InsertOutcome {
    Inserted,
    /// A reading with the same timestamp is already stored; nothing changed.
    IgnoredDuplicate,
}

fn row_to_reading(row: &Row) -> StoreResult<Reading> {
    let timestamp: String = row.get("timestamp")?;
    let pm25: f64 = row.get("pm25")?;
    let pm10: f64 = row.get("pm10")?;

    Ok(Reading::new(
        parse_timestamp(&timestamp, "timestamp")?,
        pm25,
        pm10,
    )?)
}

impl Database {
    /// Appends `reading`. Inserting a timestamp that already exists is a
    /// no-op reported as [`InsertOutcome::IgnoredDuplicate`].
    pub async fn insert(&self, reading: &Reading) -> StoreResult<InsertOutcome> {
        let record = *reading;
        let retention_limit = self.options().retention_limit;

        self.write(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open insert transaction")?;

            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO readings (timestamp, pm25, pm10)
                     VALUES (?1, ?2, ?3)",
                    params![
                        format_timestamp(&record.timestamp()),
                        record.pm25(),
                        record.pm10(),
                    ],
                )
                .context("failed to insert reading")?;

            if changed > 0 {
                if let Some(limit) = retention_limit {
                    tx.execute(
                        "DELETE FROM readings
                         WHERE timestamp NOT IN (
                             SELECT timestamp FROM readings
                             ORDER BY timestamp DESC
                             LIMIT ?1
                         )",
                        params![to_i64(limit)?],
                    )
                    .context("failed to apply retention limit")?;
                }
            }

            tx.commit().context("failed to commit reading")?;

            Ok(if changed == 0 {
                InsertOutcome::IgnoredDuplicate
            } else {
                InsertOutcome::Inserted
            })
        })
        .await
    }

    /// Up to `limit` readings, newest first.
    pub async fn recent(&self, limit: usize) -> StoreResult<Vec<Reading>> {
        let limit = to_i64(limit as u64)?;
        self.read(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, pm25, pm10
                 FROM readings
                 ORDER BY timestamp DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_reading(row)?);
            }
            Ok(readings)
        })
        .await
    }

    /// Readings with `since <= timestamp <= until`, oldest first.
    pub async fn window(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Reading>> {
        if since > until {
            return Ok(Vec::new());
        }

        let since = format_timestamp(&since);
        let until = format_timestamp(&until);
        self.read(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, pm25, pm10
                 FROM readings
                 WHERE timestamp >= ?1 AND timestamp <= ?2
                 ORDER BY timestamp ASC",
            )?;

            let mut rows = stmt.query(params![since, until])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_reading(row)?);
            }
            Ok(readings)
        })
        .await
    }

    pub async fn latest(&self) -> StoreResult<Option<Reading>> {
        Ok(self.recent(1).await?.into_iter().next())
    }

    pub async fn count(&self) -> StoreResult<u64> {
        self.read(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))
                .context("failed to count readings")?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
