use domain_admin::db::schema::{ColumnOutcome, ColumnSpec, Table, ensure_column, ensure_schema, table_columns};
use domain_admin::db::{Db, SettingsStore, seed};
use sqlx::Row;
use sqlx::sqlite::SqlitePoolOptions;

async fn memory_db() -> Db {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    Db::new(pool)
}

#[tokio::test]
async fn non_constant_default_goes_through_shadow_table() {
    let db = memory_db().await;
    db.run_script(
        "CREATE TABLE friendly_links (id TEXT PRIMARY KEY, name TEXT NOT NULL, \
         url TEXT NOT NULL, description TEXT);\
         INSERT INTO friendly_links VALUES ('a', 'Alpha', 'https://a.test', 'first');\
         INSERT INTO friendly_links VALUES ('b', 'Beta', 'https://b.test', NULL);",
    )
    .await
    .unwrap();

    let spec = ColumnSpec {
        table: Table::FriendlyLinks,
        column: "created_at",
        sql_type: "INTEGER",
        default: Some("(strftime('%s', 'now'))"),
    };
    let outcome = ensure_column(&db, &spec).await.unwrap();
    assert_eq!(outcome, ColumnOutcome::RebuiltViaShadow);

    let columns = table_columns(&db, "friendly_links").await.unwrap();
    assert_eq!(columns, vec!["id", "name", "url", "description", "created_at"]);
    assert!(
        db.get_one(
            "SELECT name FROM sqlite_master WHERE name = 'friendly_links__shadow'",
            &[]
        )
        .await
        .unwrap()
        .is_none()
    );

    let rows = db
        .get_many("SELECT * FROM friendly_links ORDER BY id", &[])
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<String, _>("name"), "Alpha");
    assert_eq!(rows[0].get::<String, _>("url"), "https://a.test");
    assert_eq!(rows[0].get::<Option<String>, _>("description").as_deref(), Some("first"));
    assert_eq!(rows[1].get::<Option<String>, _>("description"), None);
    assert!(rows[1].get::<Option<i64>, _>("created_at").is_some());

    assert_eq!(
        ensure_column(&db, &spec).await.unwrap(),
        ColumnOutcome::AlreadyPresent
    );
}

#[tokio::test]
async fn shadow_rebuild_keeps_undeclared_columns() {
    let db = memory_db().await;
    db.run_script(
        "CREATE TABLE friendly_links (id TEXT PRIMARY KEY, name TEXT NOT NULL, \
         url TEXT NOT NULL, description TEXT, updated_at INTEGER);\
         INSERT INTO friendly_links VALUES ('a', 'Alpha', 'https://a.test', NULL, 1700000000);",
    )
    .await
    .unwrap();

    let spec = ColumnSpec {
        table: Table::FriendlyLinks,
        column: "created_at",
        sql_type: "INTEGER",
        default: Some("(strftime('%s', 'now'))"),
    };
    assert_eq!(
        ensure_column(&db, &spec).await.unwrap(),
        ColumnOutcome::RebuiltViaShadow
    );

    let columns = table_columns(&db, "friendly_links").await.unwrap();
    assert_eq!(
        columns,
        vec!["id", "name", "url", "description", "created_at", "updated_at"]
    );
    let row = db
        .get_one("SELECT * FROM friendly_links WHERE id = 'a'", &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get::<i64, _>("updated_at"), 1_700_000_000);
    assert!(row.get::<Option<i64>, _>("created_at").is_some());

    // Later opens see a complete table and leave it alone.
    ensure_schema(&db).await.unwrap();
    assert_eq!(db.count("friendly_links").await.unwrap(), 1);
}

#[tokio::test]
async fn older_tables_gain_their_missing_columns() {
    let db = memory_db().await;
    db.run_script(
        "CREATE TABLE domains (id TEXT PRIMARY KEY, name TEXT NOT NULL, extension TEXT NOT NULL, \
         status TEXT NOT NULL DEFAULT 'available', registrar TEXT, registrar_icon TEXT, \
         registration_time TEXT, expiration_time TEXT, purchase_url TEXT, \
         created_at INTEGER, updated_at INTEGER);\
         INSERT INTO domains (id, name, extension) VALUES ('x', 'kept', '.org');",
    )
    .await
    .unwrap();

    ensure_schema(&db).await.unwrap();
    let columns = table_columns(&db, "domains").await.unwrap();
    assert!(columns.iter().any(|c| c == "price"));
    assert!(columns.iter().any(|c| c == "description"));

    let row = db
        .get_one("SELECT name, extension, price FROM domains WHERE id = 'x'", &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get::<String, _>("name"), "kept");
    assert_eq!(row.get::<Option<f64>, _>("price"), None);
}

#[tokio::test]
async fn legacy_settings_row_becomes_key_value_pairs() {
    let db = memory_db().await;
    db.run_script(
        "CREATE TABLE site_settings (id TEXT PRIMARY KEY, site_name TEXT, logo_type TEXT, \
         logo_text TEXT, logo_image TEXT, favicon TEXT);\
         INSERT INTO site_settings VALUES ('default', 'Old Shop', '', NULL, NULL, '');",
    )
    .await
    .unwrap();

    ensure_schema(&db).await.unwrap();
    seed::seed_all(&db).await.unwrap();

    let settings = SettingsStore::new(db).get().await.unwrap();
    assert_eq!(settings.values["siteName"], "Old Shop");
    assert_eq!(settings.values["logoType"], "text");
    assert_eq!(settings.values["logoText"], "域名展示");
    assert_eq!(settings.values["favicon"], "https://xn--1xa.team/img/favicon.ico");
    assert!(!settings.values.contains_key("logoImage"));
    assert_eq!(settings.values.len(), 4);
}
