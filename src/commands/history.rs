//! `aqmon history` and `aqmon window`: read-only queries against the store.

use anyhow::{bail, Result};
use aqmon_lib::{Database, Reading, Settings};
use chrono::{DateTime, Utc};

use super::print_reading;

pub async fn execute(settings: Settings, limit: Option<usize>, json: bool) -> Result<()> {
    let db = open_existing(&settings)?;
    let readings = db.recent(limit.unwrap_or(settings.history_limit)).await?;
    print_all(&readings, json)?;
    db.close();
    Ok(())
}

pub async fn execute_window(
    settings: Settings,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    json: bool,
) -> Result<()> {
    let db = open_existing(&settings)?;
    let readings = db.window(since, until).await?;
    print_all(&readings, json)?;
    db.close();
    Ok(())
}

/// Queries never create a store; a mistyped `--db` is an error.
fn open_existing(settings: &Settings) -> Result<Database> {
    let path = &settings.database_path;
    if !path.is_file() {
        bail!("no reading store at {}", path.display());
    }
    Database::new(path.clone(), settings.store_options())
}

fn print_all(readings: &[Reading], json: bool) -> Result<()> {
    if readings.is_empty() && !json {
        println!("No readings recorded.");
        return Ok(());
    }
    for reading in readings {
        print_reading(reading, json)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_for(path: std::path::PathBuf) -> Settings {
        Settings {
            database_path: path,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn missing_store_is_reported_and_not_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("typo.db");

        assert!(execute(settings_for(path.clone()), Some(5), true).await.is_err());
        let now = Utc::now();
        assert!(execute_window(settings_for(path.clone()), now, now, true)
            .await
            .is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn existing_store_is_queried() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("readings.db");
        Database::new(path.clone(), Default::default()).unwrap().close();

        assert!(execute(settings_for(path), Some(5), true).await.is_ok());
    }
}
