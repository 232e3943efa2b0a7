use domain_admin::db::{
    Connector, DataFiles, Db, DbManager, LifecycleState, SqliteConnector, TokioFiles,
};
use domain_admin::{AdminError, config::DataPaths, service::BackupFormat, service::BackupService};
use futures::future::join_all;
use std::fs::Permissions;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

struct CountingConnector {
    inner: SqliteConnector,
    opens: Arc<AtomicUsize>,
}

impl Connector for CountingConnector {
    async fn open(&self, path: &Path) -> Result<Db, AdminError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which other callers arrive mid-initialization.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inner.open(path).await
    }
}

/// Real filesystem calls, except the ones told to fail.
#[derive(Default)]
struct RefusingFiles {
    refuse_permissions: bool,
    refuse_remove: bool,
}

fn refused() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "refused")
}

impl DataFiles for RefusingFiles {
    async fn set_permissions(&self, path: &Path, permissions: Permissions) -> io::Result<()> {
        if self.refuse_permissions {
            return Err(refused());
        }
        TokioFiles.set_permissions(path, permissions).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        if self.refuse_remove {
            return Err(refused());
        }
        TokioFiles.remove(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        TokioFiles.rename(from, to).await
    }
}

#[tokio::test]
async fn missing_directory_and_file_are_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/deeper/database.sqlite");
    let manager = DbManager::new(&path, 100, Duration::from_secs(5));
    assert_eq!(manager.state(), LifecycleState::Uninitialized);

    manager.connection().await.unwrap();
    assert_eq!(manager.state(), LifecycleState::Ready);
    assert!(path.exists());
    assert!(manager.file_report().await.size >= 100);
}

#[tokio::test]
async fn invalidate_closes_and_forces_reopen() {
    let dir = TempDir::new().unwrap();
    let manager = DbManager::new(dir.path().join("db.sqlite"), 100, Duration::from_secs(5));
    let first = manager.connection().await.unwrap();
    manager.invalidate().await;
    assert!(first.is_closed());
    assert_eq!(manager.state(), LifecycleState::Uninitialized);

    let second = manager.connection().await.unwrap();
    assert!(!second.is_closed());
    second.ping().await.unwrap();
}

#[tokio::test]
async fn unopenable_path_fails_and_next_call_retries() {
    let dir = TempDir::new().unwrap();
    // A directory where the file should be cannot be opened as a database.
    let path = dir.path().join("db.sqlite");
    std::fs::create_dir_all(path.join("blocker")).unwrap();
    let manager = DbManager::new(&path, 0, Duration::from_secs(1));

    assert!(manager.connection().await.is_err());
    assert_eq!(manager.state(), LifecycleState::Failed);

    std::fs::remove_dir_all(&path).unwrap();
    manager.connection().await.unwrap();
    assert_eq!(manager.state(), LifecycleState::Ready);
}

#[tokio::test]
async fn concurrent_first_callers_share_one_initialization() {
    let dir = TempDir::new().unwrap();
    let opens = Arc::new(AtomicUsize::new(0));
    let manager = DbManager::with_connector(
        dir.path().join("database.sqlite"),
        100,
        CountingConnector {
            inner: SqliteConnector::default(),
            opens: opens.clone(),
        },
    );

    let results = join_all((0..16).map(|_| manager.connection())).await;
    let handles: Vec<Db> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), LifecycleState::Ready);

    // Closing through the manager closes every caller's handle, so they all
    // hold the same underlying connection.
    manager.invalidate().await;
    assert!(handles.iter().all(Db::is_closed));
}

#[tokio::test]
async fn truncated_file_is_recreated_and_seeded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    std::fs::write(&path, b"").unwrap();

    let manager = DbManager::new(&path, 100, Duration::from_secs(5));
    let db = manager.connection().await.unwrap();

    assert_eq!(db.count("domains").await.unwrap(), 5);
    assert_eq!(db.count("sold_domains").await.unwrap(), 3);
    assert_eq!(db.count("friendly_links").await.unwrap(), 5);
    assert_eq!(db.count("site_settings").await.unwrap(), 4);
    assert_eq!(db.count("registrar_icons").await.unwrap(), 5);
    assert_eq!(db.count("auth").await.unwrap(), 1);
    assert!(std::fs::metadata(&path).unwrap().len() >= 100);
}

#[tokio::test]
async fn read_only_file_is_repaired_in_place() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    {
        let first = DbManager::new(&path, 100, Duration::from_secs(5));
        let db = first.connection().await.unwrap();
        db.execute("DELETE FROM friendly_links WHERE id = '5'", &[])
            .await
            .unwrap();
        first.invalidate().await;
    }
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(&path, perms).unwrap();

    let manager = DbManager::new(&path, 100, Duration::from_secs(5));
    let db = manager.connection().await.unwrap();
    assert!(manager.file_report().await.writable);
    // Same file, not a recreated one: the earlier delete is still visible.
    assert_eq!(db.count("friendly_links").await.unwrap(), 4);
}

#[tokio::test]
async fn restore_invalidates_outstanding_handles() {
    let dir = TempDir::new().unwrap();
    let paths = DataPaths::new(dir.path(), "database.sqlite");
    let manager = Arc::new(DbManager::new(&paths.database, 100, Duration::from_secs(5)));
    let backups = BackupService::new(manager.clone(), paths, Duration::from_secs(30));

    let stale = manager.connection().await.unwrap();
    let backup = backups
        .create_backup("before", BackupFormat::Sqlite)
        .await
        .unwrap();
    backups.restore_backup(&backup.id).await.unwrap();

    assert!(stale.is_closed());
    assert!(matches!(
        stale.ping().await,
        Err(AdminError::Database(sqlx::Error::PoolClosed))
    ));
    assert_eq!(manager.state(), LifecycleState::Uninitialized);
    manager.connection().await.unwrap().ping().await.unwrap();
}

#[tokio::test]
async fn failed_permission_repair_recreates_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    {
        let first = DbManager::new(&path, 100, Duration::from_secs(5));
        let db = first.connection().await.unwrap();
        db.execute("DELETE FROM friendly_links WHERE id = '5'", &[])
            .await
            .unwrap();
        first.invalidate().await;
    }
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(&path, perms).unwrap();

    let manager = DbManager::with_parts(
        &path,
        100,
        SqliteConnector::default(),
        RefusingFiles {
            refuse_permissions: true,
            ..Default::default()
        },
    );
    let db = manager.connection().await.unwrap();
    assert!(manager.file_report().await.writable);
    // A fresh file: the earlier delete is gone with the old one.
    assert_eq!(db.count("friendly_links").await.unwrap(), 5);
}

#[tokio::test]
async fn undeletable_bad_file_is_renamed_aside() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("database.sqlite");
    std::fs::write(&path, b"").unwrap();

    let manager = DbManager::with_parts(
        &path,
        100,
        SqliteConnector::default(),
        RefusingFiles {
            refuse_remove: true,
            ..Default::default()
        },
    );
    let db = manager.connection().await.unwrap();
    assert_eq!(db.count("domains").await.unwrap(), 5);

    let aside: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("database.sqlite.bak."))
        .collect();
    assert_eq!(aside.len(), 1);
    let millis = aside[0].trim_start_matches("database.sqlite.bak.");
    assert!(millis.parse::<i64>().is_ok());
    assert_eq!(std::fs::metadata(dir.path().join(&aside[0])).unwrap().len(), 0);
}
