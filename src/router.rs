use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};
use std::sync::Arc;

use crate::config::Config;
use crate::db::DbManager;
use crate::handlers::{auth, database, domains, health, links, settings, sold_domains};
use crate::service::backup::BackupService;
use crate::service::retry::RetryPolicy;

#[derive(Clone)]
pub struct AdminState {
    pub db: Arc<DbManager>,
    pub backups: Arc<BackupService>,
    pub admin_key: Arc<str>,
    pub reset_retry: RetryPolicy,
}

impl AdminState {
    pub fn new(
        db: Arc<DbManager>,
        backups: Arc<BackupService>,
        admin_key: Arc<str>,
        reset_retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            backups,
            admin_key,
            reset_retry,
        }
    }

    /// Wire the lifecycle manager and backup service for the configured data dir.
    pub fn from_config(cfg: &Config) -> Self {
        let paths = cfg.paths();
        let db = Arc::new(DbManager::new(
            paths.database.clone(),
            cfg.min_database_size,
            cfg.busy_timeout(),
        ));
        let backups = Arc::new(BackupService::new(
            db.clone(),
            paths,
            cfg.reset_timeout(),
        ));
        Self::new(
            db,
            backups,
            Arc::from(cfg.admin_key.as_str()),
            RetryPolicy::new(cfg.reset_retry_attempts, cfg.reset_retry_delay()),
        )
    }
}

pub fn admin_router(state: AdminState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/api/domains",
            get(domains::list_domains)
                .post(domains::create_domain)
                .put(domains::update_domain)
                .delete(domains::delete_domain),
        )
        .route("/api/domains/{id}", get(domains::get_domain))
        .route("/api/domains/{id}/sold", post(domains::mark_domain_sold))
        .route(
            "/api/sold-domains",
            get(sold_domains::list_sold)
                .post(sold_domains::create_sold)
                .put(sold_domains::update_sold)
                .delete(sold_domains::delete_sold),
        )
        .route(
            "/api/friendly-links",
            get(links::list_links)
                .post(links::create_link)
                .put(links::update_link)
                .delete(links::delete_link),
        )
        .route(
            "/api/site-settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/api/site-settings/reset", post(settings::reset_settings))
        .route("/api/site-settings/{key}", put(settings::update_setting_key))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/password", put(auth::change_password))
        .route(
            "/api/auth/security-code",
            get(auth::get_security_code).put(auth::set_security_code),
        )
        .route("/api/auth/reset-by-code", post(auth::reset_by_code))
        .route("/api/database/backups", get(database::list_backups))
        .route("/api/database/backup", post(database::create_backup))
        .route("/api/database/backup/{id}", delete(database::delete_backup))
        .route("/api/database/download/{id}", get(database::download_backup))
        .route("/api/database/restore", post(database::restore_backup))
        .route(
            "/api/database/import",
            post(database::import_backup).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/database/reset", post(database::reset_database))
        .with_state(state)
}
