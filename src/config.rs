//! Process configuration.
//!
//! Defaults are layered under `DOMAIN_ADMIN_*` environment variables (a `.env`
//! file is loaded by the binaries before the first access to [`CONFIG`]).

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: invalid DOMAIN_ADMIN_* configuration"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub loglevel: String,
    pub data_dir: PathBuf,
    pub database_file: String,
    pub admin_key: String,
    /// Files smaller than this are treated as truncated and recreated.
    pub min_database_size: u64,
    pub busy_timeout_secs: u64,
    pub reset_timeout_secs: u64,
    pub reset_retry_attempts: usize,
    pub reset_retry_delay_ms: u64,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            loglevel: "info".to_string(),
            data_dir: PathBuf::from(".data"),
            database_file: "database.sqlite".to_string(),
            admin_key: "change-me".to_string(),
            min_database_size: 100,
            busy_timeout_secs: 10,
            reset_timeout_secs: 30,
            reset_retry_attempts: 3,
            reset_retry_delay_ms: 1000,
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("DOMAIN_ADMIN_"))
            .extract()
    }

    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.data_dir, &self.database_file)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }

    pub fn reset_retry_delay(&self) -> Duration {
        Duration::from_millis(self.reset_retry_delay_ms)
    }
}

/// On-disk layout: the live data file plus the backups and temp directories,
/// all under one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub backups_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>, database_file: &str) -> Self {
        let data_dir = data_dir.into();
        Self {
            database: data_dir.join(database_file),
            backups_dir: data_dir.join("backups"),
            temp_dir: data_dir.join("temp"),
            data_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_share_one_data_dir() {
        let paths = DataPaths::new("/srv/admin", "database.sqlite");
        assert_eq!(paths.database, PathBuf::from("/srv/admin/database.sqlite"));
        assert_eq!(paths.backups_dir, PathBuf::from("/srv/admin/backups"));
        assert_eq!(paths.temp_dir, PathBuf::from("/srv/admin/temp"));
    }

    #[test]
    fn defaults_match_documented_thresholds() {
        let cfg = Config::default();
        assert_eq!(cfg.min_database_size, 100);
        assert_eq!(cfg.reset_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.reset_retry_attempts, 3);
    }
}
