use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::Context;
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;
use tokio::sync::oneshot;

mod helpers;
mod migrations;
mod repositories;

use migrations::run_migrations;

pub use repositories::readings::InsertOutcome;

use crate::models::InvalidReading;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reading store is closed")]
    Closed,

    #[error(transparent)]
    InvalidReading(#[from] InvalidReading),

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Options fixed for the lifetime of an open store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Keep at most this many of the newest readings. `None` keeps everything.
    pub retention_limit: Option<u64>,
}

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

/// One connection pinned to its own OS thread.
struct DbWorker {
    sender: mpsc::Sender<DbCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DbWorker {
    fn spawn<F>(name: &str, open: F) -> anyhow::Result<Self>
    where
        F: FnOnce() -> anyhow::Result<Connection> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut conn = match open() {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                if ready_tx.send(Ok(())).is_err() {
                    error!("{thread_name}: initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                info!("{thread_name} thread shutting down");
            })
            .with_context(|| format!("failed to spawn {name} thread"))?;

        ready_rx
            .recv()
            .with_context(|| format!("{name} exited before signaling readiness"))??;

        Ok(Self {
            sender: command_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    fn shutdown(&self) {
        let mut guard = match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

struct DatabaseInner {
    writer: DbWorker,
    reader: DbWorker,
    closed: AtomicBool,
}

impl DatabaseInner {
    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.writer.shutdown();
        self.reader.shutdown();
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Durable reading history backed by SQLite in WAL mode.
///
/// Writes go through a single writer connection; queries run on a separate
/// read-only connection so they see committed data without waiting on the
/// writer. Clones share the same connections.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
    options: StoreOptions,
}

impl Database {
    pub fn new(db_path: PathBuf, options: StoreOptions) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let writer_path = db_path.clone();
        let writer = DbWorker::spawn("aqmon-db-writer", move || {
            let mut conn = Connection::open(&writer_path).context("failed to open SQLite database")?;
            conn.busy_timeout(BUSY_TIMEOUT)
                .context("failed to set busy timeout")?;
            if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                error!("Failed to enable WAL mode: {err}");
            }
            run_migrations(&mut conn).context("failed to run database migrations")?;
            Ok(conn)
        })?;

        // Opened after the writer so the schema already exists.
        let reader_path = db_path.clone();
        let reader = DbWorker::spawn("aqmon-db-reader", move || {
            let conn = Connection::open_with_flags(
                &reader_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .context("failed to open read-only SQLite connection")?;
            conn.busy_timeout(BUSY_TIMEOUT)
                .context("failed to set busy timeout")?;
            Ok(conn)
        })?;

        info!("Reading store initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                writer,
                reader,
                closed: AtomicBool::new(false),
            }),
            db_path: Arc::new(db_path),
            options,
        })
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Releases both connections. Queued work finishes first; every later
    /// call fails with [`StoreError::Closed`]. Safe to call more than once.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            info!("Closing reading store at {}", self.db_path.display());
        }
        self.inner.shutdown();
    }

    pub(crate) async fn write<F, T>(&self, task: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.execute_on(&self.inner.writer, task).await
    }

    pub(crate) async fn read<F, T>(&self, task: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.execute_on(&self.inner.reader, task).await
    }

    async fn execute_on<F, T>(&self, worker: &DbWorker, task: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        // Both failures mean the worker thread is gone.
        worker.sender.send(command).map_err(|_| StoreError::Closed)?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.db_path)
            .field("options", &self.options)
            .field("closed", &self.is_closed())
            .finish()
    }
}
