//! Backup, restore, import and reset of the live data file.
//!
//! Artifacts are plain copies of the data file kept in the backups directory
//! as `<label>-<unix millis>.<ext>`. An artifact's id is its file name without
//! the extension. Every file swap goes through the lifecycle manager, which
//! closes the live handle first and reopens lazily afterwards.
//!
//! Restore is not atomic: a crash between closing the handle and the copy
//! finishing leaves the data file in whatever state the copy reached. Reset
//! wipes and reseeds inside one transaction.

use crate::config::DataPaths;
use crate::db::lifecycle::{Connector, DbManager, SqliteConnector};
use crate::db::schema::Table;
use crate::db::{Db, seed};
use crate::error::AdminError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackupFormat {
    #[default]
    Sqlite,
    Db,
}

impl BackupFormat {
    pub const ALL: [BackupFormat; 2] = [BackupFormat::Sqlite, BackupFormat::Db];

    pub fn extension(self) -> &'static str {
        match self {
            BackupFormat::Sqlite => "sqlite",
            BackupFormat::Db => "db",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }

    fn of_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub id: String,
    pub file_name: String,
    pub size: u64,
    pub format: BackupFormat,
    /// Epoch millis.
    pub created_at: i64,
}

/// An opened artifact, ready to be streamed to a client.
#[derive(Debug)]
pub struct BackupDownload {
    pub file_name: String,
    pub size: u64,
    pub file: fs::File,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetReport {
    /// The pre-reset snapshot, when it could be taken.
    pub backup: Option<BackupInfo>,
    pub backup_error: Option<String>,
    pub seeded: Vec<&'static str>,
}

pub struct BackupService<C: Connector = SqliteConnector> {
    manager: Arc<DbManager<C>>,
    paths: DataPaths,
    reset_timeout: Duration,
}

impl<C: Connector> BackupService<C> {
    pub fn new(manager: Arc<DbManager<C>>, paths: DataPaths, reset_timeout: Duration) -> Self {
        Self {
            manager,
            paths,
            reset_timeout,
        }
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Snapshot the live data file under a sanitised form of `name`.
    pub async fn create_backup(
        &self,
        name: &str,
        format: BackupFormat,
    ) -> Result<BackupInfo, AdminError> {
        if name.trim().is_empty() {
            return Err(AdminError::Validation(
                "backup name must not be empty".to_string(),
            ));
        }
        // Open first so a missing or damaged file is repaired before copying.
        self.manager.connection().await?;

        let file_name = format!(
            "{}-{}.{}",
            sanitize_label(name),
            now_millis(),
            format.extension()
        );
        let info = self.snapshot(&file_name).await?;
        info!(id = %info.id, size = info.size, "backup created");
        Ok(info)
    }

    /// Every artifact in the backups directory, newest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, AdminError> {
        let mut backups = Vec::new();
        for path in self.artifact_paths().await? {
            backups.push(describe(&path).await?);
        }
        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(backups)
    }

    pub async fn delete_backup(&self, id: &str) -> Result<(), AdminError> {
        let path = self.resolve(id).await?;
        fs::remove_file(&path)
            .await
            .map_err(AdminError::file("deleting backup", &path))?;
        info!(path = %path.display(), "backup deleted");
        Ok(())
    }

    /// Open an artifact for streaming, with the file name to offer the client.
    pub async fn download_backup(&self, id: &str) -> Result<BackupDownload, AdminError> {
        let path = self.resolve(id).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(AdminError::file("opening backup", &path))?;
        let size = file
            .metadata()
            .await
            .map_err(AdminError::file("inspecting backup", &path))?
            .len();
        Ok(BackupDownload {
            file_name: file_name_of(&path),
            size,
            file,
        })
    }

    /// Overwrite the live data file with an artifact.
    pub async fn restore_backup(&self, id: &str) -> Result<BackupInfo, AdminError> {
        let path = self.resolve(id).await?;
        let info = describe(&path).await?;
        self.manager.replace_file(&path).await?;
        info!(id = %info.id, "database restored from backup");
        Ok(info)
    }

    /// Keep an uploaded data file as a backup and restore from it.
    ///
    /// The name and content are checked before anything is written. The
    /// staged temp file is removed whether or not the import succeeds.
    pub async fn import_backup(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<BackupInfo, AdminError> {
        let format = BackupFormat::of_path(Path::new(file_name)).ok_or_else(|| {
            AdminError::Validation(format!(
                "unsupported file type for {file_name:?}; expected .sqlite or .db"
            ))
        })?;
        if bytes.is_empty() {
            return Err(AdminError::Validation("uploaded file is empty".to_string()));
        }
        if !bytes.starts_with(SQLITE_MAGIC) {
            return Err(AdminError::Validation(
                "uploaded file is not an SQLite database".to_string(),
            ));
        }

        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(sanitize_label)
            .unwrap_or_else(|| "backup".to_string());
        let millis = now_millis();

        fs::create_dir_all(&self.paths.temp_dir)
            .await
            .map_err(AdminError::file("creating temp directory", &self.paths.temp_dir))?;
        let staged = self
            .paths
            .temp_dir
            .join(format!("temp-{millis}-{stem}.{}", format.extension()));
        fs::write(&staged, bytes)
            .await
            .map_err(AdminError::file("staging upload", &staged))?;

        let result = self.adopt_staged(&staged, &stem, millis, format).await;

        if let Err(e) = fs::remove_file(&staged).await {
            warn!(path = %staged.display(), error = %e, "failed to remove staged upload");
        }
        result
    }

    async fn adopt_staged(
        &self,
        staged: &Path,
        stem: &str,
        millis: i64,
        format: BackupFormat,
    ) -> Result<BackupInfo, AdminError> {
        self.ensure_backups_dir().await?;
        let dest = self
            .paths
            .backups_dir
            .join(format!("imported-{stem}-{millis}.{}", format.extension()));
        fs::copy(staged, &dest)
            .await
            .map_err(AdminError::file("copying upload to", &dest))?;
        let info = describe(&dest).await?;
        self.manager.replace_file(&dest).await?;
        info!(id = %info.id, size = info.size, "database imported from upload");
        Ok(info)
    }

    /// Wipe every table and reseed the baseline, within the reset budget.
    ///
    /// A snapshot is attempted first; its failure is reported, not fatal.
    pub async fn reset_database(&self) -> Result<ResetReport, AdminError> {
        let budget = self.reset_timeout;
        tokio::time::timeout(budget, self.reset_inner())
            .await
            .map_err(|_| AdminError::Timeout(budget))?
    }

    async fn reset_inner(&self) -> Result<ResetReport, AdminError> {
        // Open first so a fresh or damaged file exists before the snapshot.
        let db = self.healthy_connection().await?;
        let file_name = format!(
            "reset-backup-{}.{}",
            now_millis(),
            BackupFormat::Sqlite.extension()
        );
        let (backup, backup_error) = match self.snapshot(&file_name).await {
            Ok(info) => (Some(info), None),
            Err(e) => {
                warn!(error = %e, "pre-reset snapshot failed; continuing with reset");
                (None, Some(e.to_string()))
            }
        };

        let seeded = seed::restore_baseline(&db).await?;
        info!(tables = seeded.len(), "database reset complete");
        Ok(ResetReport {
            backup,
            backup_error,
            seeded: seeded.into_iter().map(Table::name).collect(),
        })
    }

    /// The live handle, reopened once if it no longer answers.
    async fn healthy_connection(&self) -> Result<Db, AdminError> {
        let db = self.manager.connection().await?;
        match db.ping().await {
            Ok(()) => Ok(db),
            Err(e) => {
                warn!(error = %e, "live connection failed its check; reopening");
                self.manager.invalidate().await;
                self.manager.connection().await
            }
        }
    }

    async fn snapshot(&self, file_name: &str) -> Result<BackupInfo, AdminError> {
        self.ensure_backups_dir().await?;
        let dest = self.paths.backups_dir.join(file_name);
        self.manager.snapshot_to(&dest).await?;
        describe(&dest).await
    }

    async fn ensure_backups_dir(&self) -> Result<(), AdminError> {
        fs::create_dir_all(&self.paths.backups_dir)
            .await
            .map_err(AdminError::file(
                "creating backups directory",
                &self.paths.backups_dir,
            ))
    }

    /// Recognised artifacts, sorted by file name. An absent directory has none.
    async fn artifact_paths(&self) -> Result<Vec<PathBuf>, AdminError> {
        let dir = &self.paths.backups_dir;
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AdminError::file("listing", dir)(e)),
        };
        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(AdminError::file("listing", dir))?
        {
            let path = entry.path();
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if is_file && BackupFormat::of_path(&path).is_some() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Map an artifact id to its path: exact id first, then the first artifact
    /// whose id starts with it.
    async fn resolve(&self, id: &str) -> Result<PathBuf, AdminError> {
        let id = normalize_id(id)?;
        let paths = self.artifact_paths().await?;
        let exact = paths.iter().find(|p| stem_of(p) == id);
        let chosen = exact.or_else(|| paths.iter().find(|p| stem_of(p).starts_with(id)));
        chosen
            .cloned()
            .ok_or_else(|| AdminError::NotFound(format!("backup {id}")))
    }
}

/// Reject ids that could escape the backups directory and strip a
/// recognised extension if the caller sent a full file name.
fn normalize_id(id: &str) -> Result<&str, AdminError> {
    let id = id.trim();
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(AdminError::Validation(format!("invalid backup id {id:?}")));
    }
    for format in BackupFormat::ALL {
        if let Some(stem) = id
            .strip_suffix(format.extension())
            .and_then(|s| s.strip_suffix('.'))
        {
            return Ok(stem);
        }
    }
    Ok(id)
}

/// Filesystem-safe label: Unicode letters and digits, `-` and `_`; any other
/// run of characters becomes one `-`.
pub fn sanitize_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut gap = false;
    for ch in raw.chars() {
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            if gap && !out.is_empty() {
                out.push('-');
            }
            gap = false;
            out.push(ch);
        } else {
            gap = true;
        }
    }
    let trimmed = out.trim_matches(|c| c == '-' || c == '_');
    if trimmed.is_empty() {
        "backup".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `Content-Disposition` for a download, with both the quoted and RFC 5987
/// forms percent-encoded so non-ASCII names survive.
pub fn content_disposition(file_name: &str) -> String {
    let encoded = percent_encode(file_name);
    format!("attachment; filename=\"{encoded}\"; filename*=UTF-8''{encoded}")
}

fn percent_encode(input: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => {
                out.push('%');
                out.push(HEX[(b >> 4) as usize] as char);
                out.push(HEX[(b & 0x0F) as usize] as char);
            }
        }
    }
    out
}

async fn describe(path: &Path) -> Result<BackupInfo, AdminError> {
    let meta = fs::metadata(path)
        .await
        .map_err(AdminError::file("inspecting backup", path))?;
    let created = meta
        .created()
        .or_else(|_| meta.modified())
        .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
        .unwrap_or_default();
    Ok(BackupInfo {
        id: stem_of(path).to_string(),
        file_name: file_name_of(path),
        size: meta.len(),
        format: BackupFormat::of_path(path).unwrap_or_default(),
        created_at: created,
    })
}

fn stem_of(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or_default()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_keep_unicode_and_collapse_the_rest() {
        assert_eq!(sanitize_label("Weekly Backup"), "Weekly-Backup");
        assert_eq!(sanitize_label("  每周 备份!! "), "每周-备份");
        assert_eq!(sanitize_label("a / b \\ c"), "a-b-c");
        assert_eq!(sanitize_label("__x__"), "x");
        assert_eq!(sanitize_label("!!!"), "backup");
    }

    #[test]
    fn ids_cannot_escape_the_backups_dir() {
        assert!(normalize_id("../database").is_err());
        assert!(normalize_id("a/b").is_err());
        assert!(normalize_id("a\\b").is_err());
        assert!(normalize_id("  ").is_err());
        assert_eq!(normalize_id("nightly-1").unwrap(), "nightly-1");
        assert_eq!(normalize_id("nightly-1.sqlite").unwrap(), "nightly-1");
        assert_eq!(normalize_id("nightly-1.db").unwrap(), "nightly-1");
    }

    #[test]
    fn disposition_encodes_non_ascii_names() {
        let header = content_disposition("备份-1.sqlite");
        assert_eq!(
            header,
            "attachment; filename=\"%E5%A4%87%E4%BB%BD-1.sqlite\"; \
             filename*=UTF-8''%E5%A4%87%E4%BB%BD-1.sqlite"
        );
        assert!(header.is_ascii());
    }

    #[test]
    fn formats_match_extensions_case_insensitively() {
        assert_eq!(BackupFormat::from_extension("DB"), Some(BackupFormat::Db));
        assert_eq!(
            BackupFormat::of_path(Path::new("x.sqlite")),
            Some(BackupFormat::Sqlite)
        );
        assert_eq!(BackupFormat::of_path(Path::new("x.txt")), None);
    }
}
