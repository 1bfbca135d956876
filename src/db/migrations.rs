use anyhow::{bail, Context, Result};
use log::{info, warn};
use rusqlite::{params, Connection, Transaction};

use super::helpers::{format_timestamp, parse_timestamp};

type Migration = fn(&Transaction<'_>) -> Result<()>;

/// Entry `i` upgrades `user_version` from `i` to `i + 1`.
const MIGRATIONS: &[(&str, Migration)] = &[
    ("create readings table", create_readings_table),
    ("normalize legacy timestamps", normalize_legacy_timestamps),
];

fn current_version() -> i32 {
    MIGRATIONS.len() as i32
}

/// Brings the schema up to date. Safe to run on every startup, including
/// against a database created by the legacy monitor (same table, version 0).
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let target = current_version();
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > target {
        bail!("database version ({version}) is newer than supported schema ({target})");
    }
    if version == target {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    let pending = MIGRATIONS.iter().enumerate().skip(version.max(0) as usize);
    for (index, (name, migrate)) in pending {
        migrate(&tx).with_context(|| format!("migration {} ({name}) failed", index + 1))?;
    }

    tx.pragma_update(None, "user_version", target)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

fn create_readings_table(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(include_str!("schemas/schema_v1.sql"))
        .context("failed to execute schema_v1.sql")
}

/// Rewrites naive keys from the legacy monitor into the fixed-width RFC 3339
/// form so text comparison matches time order for every row. When both forms
/// exist for one instant, the RFC 3339 row is kept.
fn normalize_legacy_timestamps(tx: &Transaction<'_>) -> Result<()> {
    let legacy: Vec<String> = {
        let mut stmt = tx.prepare("SELECT timestamp FROM readings WHERE timestamp NOT LIKE '%Z'")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut rewritten = 0usize;
    for old in &legacy {
        let normalized = match parse_timestamp(old, "timestamp") {
            Ok(at) => format_timestamp(&at),
            Err(err) => {
                warn!("Leaving unparseable reading key in place: {err:#}");
                continue;
            }
        };

        let moved = tx.execute(
            "UPDATE OR IGNORE readings SET timestamp = ?1 WHERE timestamp = ?2",
            params![normalized, old],
        )?;
        if moved == 0 {
            tx.execute("DELETE FROM readings WHERE timestamp = ?1", params![old])?;
        }
        rewritten += 1;
    }

    if rewritten > 0 {
        info!("Normalized {rewritten} legacy reading timestamp(s)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_version(conn: &Connection) -> i32 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    fn keys(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT timestamp FROM readings ORDER BY timestamp")
            .unwrap();
        let rows = stmt.query_map([], |row| row.get(0)).unwrap();
        rows.map(Result::unwrap).collect()
    }

    fn legacy_db(rows: &str) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!(
            "CREATE TABLE readings (timestamp TEXT PRIMARY KEY, pm25 REAL, pm10 REAL);
             {rows}"
        ))
        .unwrap();
        conn
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(user_version(&conn), current_version());
    }

    #[test]
    fn legacy_keys_are_rewritten_without_losing_rows() {
        let mut conn = legacy_db(
            "INSERT INTO readings VALUES ('2024-03-01T10:15:30.250000', 4.5, 9.0);
             INSERT INTO readings VALUES ('2024-03-01T10:15:31', 5.0, 10.0);",
        );

        run_migrations(&mut conn).unwrap();

        assert_eq!(
            keys(&conn),
            vec![
                "2024-03-01T10:15:30.250000Z".to_string(),
                "2024-03-01T10:15:31.000000Z".to_string(),
            ]
        );
    }

    #[test]
    fn legacy_duplicate_of_a_new_key_is_dropped() {
        let mut conn = legacy_db(
            "INSERT INTO readings VALUES ('2024-03-01T10:15:30.250000', 4.5, 9.0);
             INSERT INTO readings VALUES ('2024-03-01T10:15:30.250000Z', 7.0, 14.0);",
        );

        run_migrations(&mut conn).unwrap();

        assert_eq!(keys(&conn), vec!["2024-03-01T10:15:30.250000Z".to_string()]);
        let pm25: f64 = conn
            .query_row("SELECT pm25 FROM readings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(pm25, 7.0);
    }

    #[test]
    fn refuses_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", current_version() + 1)
            .unwrap();
        assert!(run_migrations(&mut conn).is_err());
    }
}
