//! Ownership of the process-wide database handle.
//!
//! The manager lazily opens the data file on first use, checks and repairs it,
//! brings the schema up to date, seeds empty tables and memoizes the handle.
//! Concurrent first callers queue on one lock, so exactly one initialization
//! runs and they all receive the same handle. A failed initialization leaves
//! nothing memoized and the next call starts over.
//!
//! Restore and reset go through [`DbManager::replace_file`] and
//! [`DbManager::invalidate`], which close the handle before the file changes.

use crate::db::conn::Db;
use crate::db::{schema, seed};
use crate::error::AdminError;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::fs::Permissions;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Opens a database handle for a file path.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, path: &Path) -> impl Future<Output = Result<Db, AdminError>> + Send;
}

/// Single-connection SQLite pool over the data file.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    pub busy_timeout: Duration,
}

impl Default for SqliteConnector {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(10),
        }
    }
}

impl Connector for SqliteConnector {
    async fn open(&self, path: &Path) -> Result<Db, AdminError> {
        // Rollback journal rather than WAL: the data file alone must be a
        // complete snapshot for file-level backups.
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(self.busy_timeout)
            .journal_mode(SqliteJournalMode::Delete)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Ok(Db::new(pool))
    }
}

/// The filesystem calls used to repair or set aside a bad data file.
pub trait DataFiles: Send + Sync + 'static {
    fn set_permissions(
        &self,
        path: &Path,
        permissions: Permissions,
    ) -> impl Future<Output = io::Result<()>> + Send;
    fn remove(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;
    fn rename(&self, from: &Path, to: &Path) -> impl Future<Output = io::Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFiles;

impl DataFiles for TokioFiles {
    async fn set_permissions(&self, path: &Path, permissions: Permissions) -> io::Result<()> {
        fs::set_permissions(path, permissions).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Uninitialized,
    /// An initialization, invalidation or file swap is in flight.
    Initializing,
    Ready,
    Failed,
}

enum Slot {
    Uninitialized,
    Ready(Db),
    Failed,
}

/// What the pre-open file check found.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileHealth {
    Missing,
    Healthy,
    NeedsRecreate(String),
}

/// Point-in-time facts about the data file, for diagnostics.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub path: PathBuf,
    pub exists: bool,
    pub writable: bool,
    pub size: u64,
}

pub struct DbManager<C: Connector = SqliteConnector, F: DataFiles = TokioFiles> {
    db_path: PathBuf,
    min_file_size: u64,
    connector: C,
    files: F,
    slot: Mutex<Slot>,
}

impl DbManager<SqliteConnector> {
    pub fn new(db_path: impl Into<PathBuf>, min_file_size: u64, busy_timeout: Duration) -> Self {
        Self::with_connector(db_path, min_file_size, SqliteConnector { busy_timeout })
    }
}

impl<C: Connector> DbManager<C> {
    pub fn with_connector(db_path: impl Into<PathBuf>, min_file_size: u64, connector: C) -> Self {
        DbManager::with_parts(db_path, min_file_size, connector, TokioFiles)
    }
}

impl<C: Connector, F: DataFiles> DbManager<C, F> {
    pub fn with_parts(
        db_path: impl Into<PathBuf>,
        min_file_size: u64,
        connector: C,
        files: F,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            min_file_size,
            connector,
            files,
            slot: Mutex::new(Slot::Uninitialized),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn state(&self) -> LifecycleState {
        match self.slot.try_lock() {
            Err(_) => LifecycleState::Initializing,
            Ok(slot) => match &*slot {
                Slot::Uninitialized => LifecycleState::Uninitialized,
                Slot::Ready(_) => LifecycleState::Ready,
                Slot::Failed => LifecycleState::Failed,
            },
        }
    }

    /// The shared handle, initializing it on first use.
    pub async fn connection(&self) -> Result<Db, AdminError> {
        let mut slot = self.slot.lock().await;
        if let Slot::Ready(db) = &*slot {
            return Ok(db.clone());
        }
        match self.initialize().await {
            Ok(db) => {
                *slot = Slot::Ready(db.clone());
                Ok(db)
            }
            Err(e) => {
                *slot = Slot::Failed;
                Err(e)
            }
        }
    }

    /// Close the shared handle; the next `connection()` reopens from scratch.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        Self::close_slot(&mut slot).await;
    }

    /// Copy the live data file to `dest`. Returns the number of bytes copied.
    ///
    /// No handle can be opened or swapped meanwhile, and an open handle's only
    /// connection is checked out, so the copy sees committed state only.
    pub async fn snapshot_to(&self, dest: &Path) -> Result<u64, AdminError> {
        let slot = self.slot.lock().await;
        let _writers_parked = match &*slot {
            Slot::Ready(db) => Some(db.hold().await?),
            Slot::Uninitialized | Slot::Failed => None,
        };
        fs::copy(&self.db_path, dest)
            .await
            .map_err(AdminError::file("copying data file to", dest))
    }

    /// Replace the live data file with `source`.
    ///
    /// The current handle is closed first and the manager returns to
    /// uninitialized, so the next access reopens and re-validates the new file.
    pub async fn replace_file(&self, source: &Path) -> Result<(), AdminError> {
        let mut slot = self.slot.lock().await;
        Self::close_slot(&mut slot).await;
        remove_sidecar_journal(&self.db_path).await;
        fs::copy(source, &self.db_path)
            .await
            .map_err(AdminError::file("restoring data file from", source))?;
        info!(
            source = %source.display(),
            target = %self.db_path.display(),
            "data file replaced"
        );
        Ok(())
    }

    pub async fn file_report(&self) -> FileReport {
        match fs::metadata(&self.db_path).await {
            Ok(meta) => FileReport {
                path: self.db_path.clone(),
                exists: true,
                writable: !meta.permissions().readonly(),
                size: meta.len(),
            },
            Err(_) => FileReport {
                path: self.db_path.clone(),
                exists: false,
                writable: false,
                size: 0,
            },
        }
    }

    async fn close_slot(slot: &mut Slot) {
        if let Slot::Ready(db) = std::mem::replace(slot, Slot::Uninitialized) {
            db.close().await;
            info!("database connection closed");
        }
    }

    async fn initialize(&self) -> Result<Db, AdminError> {
        if let Some(dir) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(AdminError::file("creating data directory", dir))?;
        }

        match self.check_file().await? {
            FileHealth::Missing => {
                info!(path = %self.db_path.display(), "data file missing; creating");
            }
            FileHealth::Healthy => {}
            FileHealth::NeedsRecreate(reason) => {
                warn!(path = %self.db_path.display(), reason = %reason, "recreating data file");
                self.set_aside().await?;
            }
        }

        let db = self.connector.open(&self.db_path).await?;
        if let Err(e) = self.prepare(&db).await {
            db.close().await;
            return Err(e);
        }
        info!(path = %self.db_path.display(), "database ready");
        Ok(db)
    }

    async fn prepare(&self, db: &Db) -> Result<(), AdminError> {
        db.ping().await?;
        schema::ensure_schema(db).await?;
        seed::seed_all(db).await?;
        Ok(())
    }

    async fn check_file(&self) -> Result<FileHealth, AdminError> {
        let meta = match fs::metadata(&self.db_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileHealth::Missing),
            Err(e) => return Err(AdminError::file("inspecting", &self.db_path)(e)),
        };

        let mut permissions = meta.permissions();
        if permissions.readonly() {
            warn!(path = %self.db_path.display(), "data file is read-only; repairing permissions");
            permissions.set_readonly(false);
            if let Err(e) = self.files.set_permissions(&self.db_path, permissions).await {
                return Ok(FileHealth::NeedsRecreate(format!(
                    "read-only and permission repair failed: {e}"
                )));
            }
        }

        if meta.len() < self.min_file_size {
            warn!(
                path = %self.db_path.display(),
                size = meta.len(),
                threshold = self.min_file_size,
                "data file looks corrupted (too small)"
            );
            return Ok(FileHealth::NeedsRecreate(format!(
                "{} bytes is below the {} byte minimum",
                meta.len(),
                self.min_file_size
            )));
        }
        Ok(FileHealth::Healthy)
    }

    /// Delete the bad file, or rename it aside when deletion is refused.
    async fn set_aside(&self) -> Result<(), AdminError> {
        remove_sidecar_journal(&self.db_path).await;
        let Err(remove_err) = self.files.remove(&self.db_path).await else {
            info!(path = %self.db_path.display(), "bad data file removed");
            return Ok(());
        };
        let aside = PathBuf::from(format!(
            "{}.bak.{}",
            self.db_path.display(),
            Utc::now().timestamp_millis()
        ));
        warn!(error = %remove_err, aside = %aside.display(), "delete failed; renaming data file aside");
        self.files
            .rename(&self.db_path, &aside)
            .await
            .map_err(AdminError::file("renaming aside", &self.db_path))
    }
}

async fn remove_sidecar_journal(db_path: &Path) {
    let journal = PathBuf::from(format!("{}-journal", db_path.display()));
    if let Err(e) = fs::remove_file(&journal).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %journal.display(), error = %e, "failed to remove stale journal");
    }
}
