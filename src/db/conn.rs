//! Uniform async call surface over the single SQLite handle.
//!
//! Every call either yields a value or a typed [`AdminError`]; driver errors are
//! never swallowed. Parameters bind positionally in the order given.

use crate::error::AdminError;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteQueryResult, SqliteRow};
use sqlx::{Executor, Pool, Sqlite, Transaction};

pub type SqlitePool = Pool<Sqlite>;

/// A positional SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Build a parameter list: `params![name, ext, 42_i64]`.
#[macro_export]
macro_rules! params {
    () => { Vec::<$crate::db::conn::SqlValue>::new() };
    ($($v:expr),+ $(,)?) => { vec![$($crate::db::conn::SqlValue::from($v)),+] };
}

/// What an `execute` call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecSummary {
    pub rows_affected: u64,
    pub last_insert_id: i64,
}

impl From<SqliteQueryResult> for ExecSummary {
    fn from(r: SqliteQueryResult) -> Self {
        Self {
            rows_affected: r.rows_affected(),
            last_insert_id: r.last_insert_rowid(),
        }
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for p in params {
        query = match p {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

/// Shared handle to the live database.
///
/// Cloning is cheap and every clone talks to the same underlying connection.
/// Clones must not outlive a restore or reset: once the lifecycle manager
/// closes the handle, every call on a stale clone fails with `PoolClosed`.
#[derive(Clone, Debug)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get_one(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<SqliteRow>, AdminError> {
        Ok(bind_all(sqlx::query(sql), params)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_many(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqliteRow>, AdminError> {
        Ok(bind_all(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecSummary, AdminError> {
        let result = bind_all(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.into())
    }

    /// Run a multi-statement script (DDL, bulk DML) without parameters.
    pub async fn run_script(&self, sql: &str) -> Result<(), AdminError> {
        Executor::execute(&self.pool, sql).await?;
        Ok(())
    }

    /// Count rows of a table. The name must come from a trusted source.
    pub async fn count(&self, table: &str) -> Result<i64, AdminError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Start a unit of work. Dropping the returned value without `commit`
    /// rolls everything back.
    pub async fn begin(&self) -> Result<DbTx, AdminError> {
        Ok(DbTx {
            tx: self.pool.begin().await?,
        })
    }

    /// Run `SELECT 1` to prove the handle is usable.
    pub async fn ping(&self) -> Result<(), AdminError> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        debug_assert_eq!(one, 1);
        Ok(())
    }

    /// Check out the only connection. While the guard lives, every other
    /// call on any clone waits, so the data file does not change underneath.
    pub(crate) async fn hold(&self) -> Result<PoolConnection<Sqlite>, AdminError> {
        Ok(self.pool.acquire().await?)
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }
}

/// The same call surface, scoped to one transaction.
pub struct DbTx {
    tx: Transaction<'static, Sqlite>,
}

impl DbTx {
    pub async fn get_one(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<SqliteRow>, AdminError> {
        Ok(bind_all(sqlx::query(sql), params)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    pub async fn get_many(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqliteRow>, AdminError> {
        Ok(bind_all(sqlx::query(sql), params)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ExecSummary, AdminError> {
        let result = bind_all(sqlx::query(sql), params)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.into())
    }

    pub async fn run_script(&mut self, sql: &str) -> Result<(), AdminError> {
        Executor::execute(&mut *self.tx, sql).await?;
        Ok(())
    }

    pub async fn commit(self) -> Result<(), AdminError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;
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
    async fn binds_positional_parameters_in_order() {
        let db = memory_db().await;
        db.run_script("CREATE TABLE t (a TEXT, b INTEGER, c REAL, d TEXT);")
            .await
            .unwrap();
        let summary = db
            .execute(
                "INSERT INTO t (a, b, c, d) VALUES (?, ?, ?, ?)",
                &params!["first", 2_i64, 3.5_f64, None::<String>],
            )
            .await
            .unwrap();
        assert_eq!(summary.rows_affected, 1);
        assert_eq!(summary.last_insert_id, 1);

        let row = db
            .get_one("SELECT a, b, c, d FROM t WHERE b = ?", &params![2_i64])
            .await
            .unwrap()
            .expect("row");
        assert_eq!(row.get::<String, _>("a"), "first");
        assert_eq!(row.get::<f64, _>("c"), 3.5);
        assert_eq!(row.get::<Option<String>, _>("d"), None);
    }

    #[tokio::test]
    async fn driver_errors_surface_as_failed_results() {
        let db = memory_db().await;
        let result = db.get_many("SELECT * FROM missing_table", &[]).await;
        assert!(matches!(result, Err(AdminError::Database(_))));
        assert!(db.run_script("NOT SQL AT ALL;").await.is_err());
    }

    #[tokio::test]
    async fn get_one_is_absent_for_no_rows() {
        let db = memory_db().await;
        db.run_script("CREATE TABLE t (a TEXT);").await.unwrap();
        assert!(db.get_one("SELECT a FROM t", &[]).await.unwrap().is_none());
        assert!(db.get_many("SELECT a FROM t", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let db = memory_db().await;
        db.run_script("CREATE TABLE t (a TEXT);").await.unwrap();
        {
            let mut tx = db.begin().await.unwrap();
            tx.execute("INSERT INTO t (a) VALUES (?)", &params!["x"])
                .await
                .unwrap();
        }
        assert_eq!(db.count("t").await.unwrap(), 0);

        let mut tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO t (a) VALUES (?)", &params!["y"])
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(db.count("t").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn closed_handle_fails_instead_of_hanging() {
        let db = memory_db().await;
        let stale = db.clone();
        db.close().await;
        assert!(stale.is_closed());
        assert!(matches!(
            stale.ping().await.unwrap_err(),
            AdminError::Database(sqlx::Error::PoolClosed)
        ));
    }
}
