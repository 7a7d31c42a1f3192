//! SQLite access layer.
//!
//! Every model goes through [`Database::fetch`] and [`Database::execute`],
//! which bind a list of [`QueryParam`] in order and classify driver failures
//! into [`DatabaseError`]. Rows are mapped with `sqlx::FromRow`: a missing
//! column or an incompatible type is reported as [`DatabaseError::Mapping`].
pub mod migration;

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::time::Duration;

use axum::extract::FromRef;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool};

use crate::AppState;
use crate::error::DatabaseError;

pub const DEFAULT_DATABASE_PATH: &str = "notes.db";
pub const DEFAULT_POOL_SIZE: u32 = 5;

type Result<T> = std::result::Result<T, DatabaseError>;

/// Type-safe parameter binding for SQL queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timestamp(DateTime<Utc>),
    Null,
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for QueryParam {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                QueryParam::Int(value) => query.bind(*value),
                QueryParam::Float(value) => query.bind(*value),
                QueryParam::Bool(value) => query.bind(*value),
                QueryParam::Text(value) => query.bind(value.clone()),
                QueryParam::Timestamp(value) => query.bind(*value),
                QueryParam::Null => query.bind(None::<String>),
            };
        }
        query
    }};
}

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Open the database file, creating it when missing.
    pub async fn new(path: impl AsRef<Path>, pool: u32) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(pool)
            .connect_with(options)
            .await?;

        tracing::info!(path = %path.display(), "sqlite connected");

        Ok(Self { pool })
    }

    /// Wrap an already opened pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a connection for the duration of the returned guard.
    ///
    /// When `conn` is given it is reused and stays owned by the caller,
    /// otherwise one is taken from the pool and given back on drop.
    pub async fn scoped<'c>(
        &self,
        conn: Option<&'c mut SqliteConnection>,
    ) -> Result<Scoped<'c>> {
        let inner = match conn {
            Some(conn) => Inner::Borrowed(conn),
            None => Inner::Pooled(self.pool.acquire().await?),
        };

        Ok(Scoped { inner })
    }

    /// Run a query and map every row into `T`.
    ///
    /// Returns the rows along with their count.
    pub async fn fetch<T>(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<(Vec<T>, u64)>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let query = bind_params!(sqlx::query_as::<_, T>(sql), params);
        let rows = query.fetch_all(&mut *conn).await?;
        let count = rows.len() as u64;

        Ok((rows, count))
    }

    /// Run a query expecting at most one row.
    pub async fn fetch_optional<T>(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let query = bind_params!(sqlx::query_as::<_, T>(sql), params);
        Ok(query.fetch_optional(&mut *conn).await?)
    }

    /// Run a statement, returning the number of affected rows.
    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<u64> {
        let query = bind_params!(sqlx::query(sql), params);
        Ok(query.execute(&mut *conn).await?.rows_affected())
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Database {
        app_state.db.clone()
    }
}

enum Inner<'c> {
    Pooled(PoolConnection<Sqlite>),
    Borrowed(&'c mut SqliteConnection),
}

/// Connection handed out by [`Database::scoped`].
pub struct Scoped<'c> {
    inner: Inner<'c>,
}

impl Deref for Scoped<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match &self.inner {
            Inner::Pooled(conn) => &**conn,
            Inner::Borrowed(conn) => &**conn,
        }
    }
}

impl DerefMut for Scoped<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match &mut self.inner {
            Inner::Pooled(conn) => &mut **conn,
            Inner::Borrowed(conn) => &mut **conn,
        }
    }
}
