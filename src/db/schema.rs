//! Table declarations and additive migrations.
//!
//! Every statement here is idempotent and runs on each first open of the data
//! file: create missing tables, convert the legacy single-row settings table to
//! key/value form, then add any columns older files lack.

use crate::db::conn::{Db, DbTx};
use crate::error::AdminError;
use crate::params;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::{info, warn};

const NOW_DEFAULT: &str = "INTEGER DEFAULT (strftime('%s', 'now'))";

pub const DEFAULT_SITE_NAME: &str = "域名展示";
pub const DEFAULT_LOGO_TYPE: &str = "text";
pub const DEFAULT_FAVICON: &str = "https://xn--1xa.team/img/favicon.ico";

/// Every table the application owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Domains,
    SoldDomains,
    FriendlyLinks,
    SiteSettings,
    RegistrarIcons,
    Auth,
}

impl Table {
    /// Creation, wipe and seed order.
    pub const ALL: [Table; 6] = [
        Table::Domains,
        Table::SoldDomains,
        Table::FriendlyLinks,
        Table::SiteSettings,
        Table::RegistrarIcons,
        Table::Auth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Domains => "domains",
            Table::SoldDomains => "sold_domains",
            Table::FriendlyLinks => "friendly_links",
            Table::SiteSettings => "site_settings",
            Table::RegistrarIcons => "registrar_icons",
            Table::Auth => "auth",
        }
    }

    /// Column name and declaration, in table order.
    pub fn columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Table::Domains => &[
                ("id", "TEXT PRIMARY KEY"),
                ("name", "TEXT NOT NULL"),
                ("extension", "TEXT NOT NULL"),
                ("status", "TEXT NOT NULL DEFAULT 'available'"),
                ("registrar", "TEXT"),
                ("registrar_icon", "TEXT"),
                ("registration_time", "TEXT"),
                ("expiration_time", "TEXT"),
                ("purchase_url", "TEXT"),
                ("price", "REAL"),
                ("description", "TEXT"),
                ("created_at", NOW_DEFAULT),
                ("updated_at", NOW_DEFAULT),
            ],
            Table::SoldDomains => &[
                ("id", "TEXT PRIMARY KEY"),
                ("name", "TEXT NOT NULL"),
                ("extension", "TEXT NOT NULL"),
                ("status", "TEXT NOT NULL DEFAULT 'sold'"),
                ("sold_to", "TEXT"),
                ("sold_date", "TEXT"),
                ("sold_price", "REAL"),
                ("description", "TEXT"),
                ("created_at", NOW_DEFAULT),
                ("updated_at", NOW_DEFAULT),
            ],
            Table::FriendlyLinks => &[
                ("id", "TEXT PRIMARY KEY"),
                ("name", "TEXT NOT NULL"),
                ("url", "TEXT NOT NULL"),
                ("description", "TEXT"),
                ("created_at", NOW_DEFAULT),
            ],
            Table::SiteSettings => &[("key", "TEXT PRIMARY KEY"), ("value", "TEXT")],
            Table::RegistrarIcons => &[
                ("id", "TEXT PRIMARY KEY"),
                ("name", "TEXT NOT NULL UNIQUE"),
                ("svg", "TEXT NOT NULL"),
                ("created_at", NOW_DEFAULT),
                ("updated_at", NOW_DEFAULT),
            ],
            Table::Auth => &[
                ("id", "TEXT PRIMARY KEY DEFAULT 'admin'"),
                ("password", "TEXT DEFAULT 'admin123'"),
                ("security_code", "TEXT DEFAULT ''"),
                ("is_logged_in", "INTEGER DEFAULT 0"),
                ("created_at", NOW_DEFAULT),
                ("updated_at", NOW_DEFAULT),
            ],
        }
    }

    pub fn create_sql(self) -> String {
        create_table_sql(self.name(), self.columns(), None)
    }
}

fn create_table_sql(
    name: &str,
    columns: &[(&str, &str)],
    extra: Option<(&str, String)>,
) -> String {
    let mut defs: Vec<String> = columns
        .iter()
        .map(|(col, decl)| format!("{col} {decl}"))
        .collect();
    if let Some((col, decl)) = extra {
        defs.push(format!("{col} {decl}"));
    }
    format!("CREATE TABLE IF NOT EXISTS {name} (\n    {}\n)", defs.join(",\n    "))
}

/// A column that older data files may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub table: Table,
    pub column: &'static str,
    pub sql_type: &'static str,
    /// SQL default expression, e.g. `''` or `(strftime('%s', 'now'))`.
    pub default: Option<&'static str>,
}

impl ColumnSpec {
    fn declaration(&self) -> String {
        match self.default {
            Some(d) => format!("{} DEFAULT {d}", self.sql_type),
            None => self.sql_type.to_string(),
        }
    }
}

pub const COLUMN_MIGRATIONS: &[ColumnSpec] = &[
    ColumnSpec {
        table: Table::Domains,
        column: "price",
        sql_type: "REAL",
        default: None,
    },
    ColumnSpec {
        table: Table::Domains,
        column: "description",
        sql_type: "TEXT",
        default: None,
    },
    ColumnSpec {
        table: Table::SoldDomains,
        column: "sold_price",
        sql_type: "REAL",
        default: None,
    },
    ColumnSpec {
        table: Table::SoldDomains,
        column: "description",
        sql_type: "TEXT",
        default: None,
    },
    ColumnSpec {
        table: Table::Auth,
        column: "security_code",
        sql_type: "TEXT",
        default: Some("''"),
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOutcome {
    AlreadyPresent,
    AddedInPlace,
    RebuiltViaShadow,
}

/// Create every table, migrate legacy shapes and add missing columns.
pub async fn ensure_schema(db: &Db) -> Result<(), AdminError> {
    for table in Table::ALL {
        db.run_script(&table.create_sql()).await?;
    }
    migrate_legacy_settings(db).await?;
    for spec in COLUMN_MIGRATIONS {
        ensure_column(db, spec).await?;
    }
    info!("database schema ensured");
    Ok(())
}

pub async fn table_columns(db: &Db, table: &str) -> Result<Vec<String>, AdminError> {
    let rows = db.get_many(&format!("PRAGMA table_info({table})"), &[]).await?;
    column_names(rows)
}

async fn tx_table_columns(tx: &mut DbTx, table: &str) -> Result<Vec<String>, AdminError> {
    let rows = tx.get_many(&format!("PRAGMA table_info({table})"), &[]).await?;
    column_names(rows)
}

fn column_names(rows: Vec<SqliteRow>) -> Result<Vec<String>, AdminError> {
    rows.into_iter()
        .map(|r| r.try_get::<String, _>("name").map_err(AdminError::from))
        .collect()
}

/// Add `spec.column` if absent.
///
/// Tries `ALTER TABLE ... ADD COLUMN` first. SQLite refuses that for some
/// declarations (non-constant defaults, constraints), in which case the table
/// is rebuilt through a shadow copy inside one transaction: every existing
/// row and value is carried over and the new column takes its default.
pub async fn ensure_column(db: &Db, spec: &ColumnSpec) -> Result<ColumnOutcome, AdminError> {
    let table = spec.table.name();
    let existing = table_columns(db, table).await?;
    if existing.iter().any(|c| c == spec.column) {
        return Ok(ColumnOutcome::AlreadyPresent);
    }

    let alter = format!(
        "ALTER TABLE {table} ADD COLUMN {} {}",
        spec.column,
        spec.declaration()
    );
    match db.run_script(&alter).await {
        Ok(()) => {
            info!(table, column = spec.column, "column added");
            Ok(ColumnOutcome::AddedInPlace)
        }
        Err(e) => {
            warn!(
                table,
                column = spec.column,
                error = %e,
                "in-place column add rejected; rebuilding through shadow table"
            );
            rebuild_with_column(db, spec, &existing).await?;
            info!(table, column = spec.column, "column added via shadow table");
            Ok(ColumnOutcome::RebuiltViaShadow)
        }
    }
}

async fn rebuild_with_column(
    db: &Db,
    spec: &ColumnSpec,
    existing: &[String],
) -> Result<(), AdminError> {
    let table = spec.table.name();
    let shadow = format!("{table}__shadow");
    let desired = spec.table.columns();
    let extra = (!desired.iter().any(|(c, _)| *c == spec.column))
        .then(|| (spec.column, spec.declaration()));

    let mut tx = db.begin().await?;
    tx.run_script(&format!("DROP TABLE IF EXISTS {shadow}"))
        .await?;
    tx.run_script(&create_table_sql(&shadow, desired, extra))
        .await?;

    // Columns added by hand or by older builds come along with their type.
    let shadow_columns = tx_table_columns(&mut tx, &shadow).await?;
    let rows = tx.get_many(&format!("PRAGMA table_info({table})"), &[]).await?;
    for row in rows {
        let name: String = row.try_get("name")?;
        if shadow_columns.contains(&name) {
            continue;
        }
        let sql_type: String = row.try_get("type")?;
        warn!(table, column = %name, "carrying undeclared column through rebuild");
        tx.run_script(&format!("ALTER TABLE {shadow} ADD COLUMN {name} {sql_type}"))
            .await?;
    }

    let cols = existing.join(", ");
    tx.run_script(&format!(
        "INSERT INTO {shadow} ({cols}) SELECT {cols} FROM {table};\n\
         DROP TABLE {table};\n\
         ALTER TABLE {shadow} RENAME TO {table};"
    ))
    .await?;
    tx.commit().await
}

/// Convert a settings table in the old singleton shape (`id` plus one column
/// per setting) into key/value rows. Missing or empty legacy fields fall back
/// to the documented defaults; `logoImage` is only carried when present.
///
/// Returns whether a migration happened.
pub async fn migrate_legacy_settings(db: &Db) -> Result<bool, AdminError> {
    let table = Table::SiteSettings.name();
    let columns = table_columns(db, table).await?;
    if !columns.iter().any(|c| c == "id") {
        return Ok(false);
    }
    warn!("legacy site_settings layout detected; migrating to key/value");

    let mut tx = db.begin().await?;
    let legacy = tx
        .get_one("SELECT * FROM site_settings WHERE id = 'default'", &[])
        .await?;
    tx.run_script(&format!("DROP TABLE {table}")).await?;
    tx.run_script(&Table::SiteSettings.create_sql()).await?;

    let mut migrated = 0usize;
    if let Some(row) = legacy {
        let field = |col: &str| {
            row.try_get::<Option<String>, _>(col)
                .ok()
                .flatten()
                .filter(|v| !v.is_empty())
        };
        let mut pairs = vec![
            (
                "siteName",
                field("site_name").unwrap_or_else(|| DEFAULT_SITE_NAME.to_string()),
            ),
            (
                "logoType",
                field("logo_type").unwrap_or_else(|| DEFAULT_LOGO_TYPE.to_string()),
            ),
            (
                "logoText",
                field("logo_text").unwrap_or_else(|| DEFAULT_SITE_NAME.to_string()),
            ),
        ];
        if let Some(image) = field("logo_image") {
            pairs.push(("logoImage", image));
        }
        pairs.push((
            "favicon",
            field("favicon").unwrap_or_else(|| DEFAULT_FAVICON.to_string()),
        ));

        for (key, value) in pairs {
            tx.execute(
                "INSERT INTO site_settings (key, value) VALUES (?, ?)",
                &params![key, value],
            )
            .await?;
            migrated += 1;
        }
    }
    tx.commit().await?;
    info!(migrated, "legacy site_settings migrated");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_db() -> Db {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Db::new(pool)
    }

    #[test]
    fn create_sql_lists_every_column() {
        let sql = Table::Auth.create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS auth ("));
        for (col, _) in Table::Auth.columns() {
            assert!(sql.contains(col), "{col} missing from {sql}");
        }
    }

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let db = memory_db().await;
        ensure_schema(&db).await.unwrap();
        ensure_schema(&db).await.unwrap();
        for table in Table::ALL {
            let cols = table_columns(&db, table.name()).await.unwrap();
            assert_eq!(cols.len(), table.columns().len(), "{}", table.name());
        }
    }

    #[tokio::test]
    async fn missing_plain_column_is_added_in_place() {
        let db = memory_db().await;
        db.run_script(
            "CREATE TABLE auth (id TEXT PRIMARY KEY DEFAULT 'admin', password TEXT, \
             is_logged_in INTEGER DEFAULT 0, created_at INTEGER, updated_at INTEGER);\
             INSERT INTO auth (id, password) VALUES ('admin', 'secret');",
        )
        .await
        .unwrap();

        let spec = COLUMN_MIGRATIONS
            .iter()
            .find(|s| s.column == "security_code")
            .unwrap();
        assert_eq!(
            ensure_column(&db, spec).await.unwrap(),
            ColumnOutcome::AddedInPlace
        );
        assert_eq!(
            ensure_column(&db, spec).await.unwrap(),
            ColumnOutcome::AlreadyPresent
        );
        let row = db
            .get_one("SELECT password, security_code FROM auth", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get::<String, _>("password"), "secret");
        assert_eq!(row.get::<String, _>("security_code"), "");
    }
}
