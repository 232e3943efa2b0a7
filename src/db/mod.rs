//! Database module: the shared handle, its lifecycle, schema and stores.
//!
//! Layout:
//! - `conn.rs`: async call surface over the single SQLite handle
//! - `lifecycle.rs`: lazy open, file repair, memoization and invalidation
//! - `schema.rs`: table DDL and additive migrations
//! - `seed.rs`: baseline rows for empty tables
//! - `models.rs`: row structs exchanged with the HTTP layer
//! - `sqlite.rs`: typed stores built on the handle

pub mod conn;
pub mod lifecycle;
pub mod models;
pub mod schema;
pub mod seed;
pub mod sqlite;

pub use conn::{Db, DbTx, ExecSummary, SqlValue, SqlitePool};
pub use lifecycle::{
    Connector, DataFiles, DbManager, FileReport, LifecycleState, SqliteConnector, TokioFiles,
};
pub use schema::Table;
pub use sqlite::{AuthStore, DomainStore, LinkStore, SettingsStore, SoldDomainStore};
