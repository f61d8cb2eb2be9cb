//! Database gateway: one interface over the SQLite, SQL Server and MySQL backends.
//!
//! The backend is fixed once from `db.driver` when the [`Gateway`] is built.
//! Each query opens its own connection and closes it before returning, on
//! both the success and the error path:
//! - `sqlite`: sqlx `SqliteConnection`
//! - `mysql`: sqlx `MySqlConnection`
//! - `sqlserver`: tiberius client (cargo feature `sqlserver`)

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::config::{Db, Tables};
use crate::model::{Backend, DuplicateJobcode, FailedPush, JobcodeRow, NewRow};

pub mod mysql;
pub mod sqlite;
#[cfg(feature = "sqlserver")]
pub mod sqlserver;

/// Status value marking a failed push.
pub const FAILED_PUSH_STATUS: &str = "2";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("no driver available for {0} (not compiled in)")]
    DriverUnavailable(&'static str),
    #[error("{backend} connection failed: {message}")]
    Connection {
        backend: &'static str,
        message: String,
    },
    #[error("query failed: {0}")]
    Query(String),
}

impl DbError {
    pub(crate) fn connection(backend: Backend, err: impl std::fmt::Display) -> Self {
        DbError::Connection {
            backend: backend.as_str(),
            message: err.to_string(),
        }
    }

    pub(crate) fn query(err: impl std::fmt::Display) -> Self {
        DbError::Query(err.to_string())
    }

    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            DbError::DriverUnavailable(_) | DbError::Connection { .. }
        )
    }
}

/// Backends compiled into this binary. Probed once at startup and passed down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailableDrivers {
    pub sqlite: bool,
    pub sqlserver: bool,
    pub mysql: bool,
}

impl AvailableDrivers {
    pub fn probe() -> Self {
        Self {
            sqlite: true,
            sqlserver: cfg!(feature = "sqlserver"),
            mysql: true,
        }
    }

    pub fn supports(&self, backend: Backend) -> bool {
        match backend {
            Backend::Sqlite => self.sqlite,
            Backend::SqlServer => self.sqlserver,
            Backend::MySql => self.mysql,
        }
    }
}

/// The fixed queries every backend answers.
#[async_trait]
pub trait DatabaseGateway: Send + Sync {
    fn backend(&self) -> Backend;

    /// Jobcodes occurring more than once, jobcode descending.
    async fn duplicate_jobcodes(&self) -> Result<Vec<DuplicateJobcode>, DbError>;

    /// Distinct non-blank jobcodes, ascending.
    async fn nonempty_jobcodes(&self) -> Result<Vec<JobcodeRow>, DbError>;

    /// Rows with `id > last_id`, ascending, at most `limit`.
    async fn new_rows(&self, last_id: i64, limit: i64) -> Result<Vec<NewRow>, DbError>;

    /// Rows whose status column equals [`FAILED_PUSH_STATUS`].
    async fn failed_push(&self) -> Result<Vec<FailedPush>, DbError>;
}

/// An open connection to one backend.
pub enum Connection {
    Sqlite(sqlx::SqliteConnection),
    MySql(sqlx::MySqlConnection),
    #[cfg(feature = "sqlserver")]
    SqlServer(sqlserver::Client),
}

impl Connection {
    pub async fn duplicate_jobcodes(
        &mut self,
        tables: &Tables,
    ) -> Result<Vec<DuplicateJobcode>, DbError> {
        match self {
            Connection::Sqlite(c) => sqlite::duplicate_jobcodes(c, &tables.jobcode).await,
            Connection::MySql(c) => mysql::duplicate_jobcodes(c, &tables.jobcode).await,
            #[cfg(feature = "sqlserver")]
            Connection::SqlServer(c) => sqlserver::duplicate_jobcodes(c, &tables.jobcode).await,
        }
    }

    pub async fn nonempty_jobcodes(&mut self, tables: &Tables) -> Result<Vec<JobcodeRow>, DbError> {
        let rows = match self {
            Connection::Sqlite(c) => sqlite::nonempty_jobcodes(c, &tables.jobcode).await?,
            Connection::MySql(c) => mysql::nonempty_jobcodes(c, &tables.jobcode).await?,
            #[cfg(feature = "sqlserver")]
            Connection::SqlServer(c) => sqlserver::nonempty_jobcodes(c, &tables.jobcode).await?,
        };
        Ok(retain_nonblank(rows))
    }

    pub async fn new_rows(
        &mut self,
        tables: &Tables,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<NewRow>, DbError> {
        match self {
            Connection::Sqlite(c) => sqlite::new_rows(c, &tables.alerts, last_id, limit).await,
            Connection::MySql(c) => mysql::new_rows(c, &tables.alerts, last_id, limit).await,
            #[cfg(feature = "sqlserver")]
            Connection::SqlServer(c) => {
                sqlserver::new_rows(c, &tables.alerts, last_id, limit).await
            }
        }
    }

    pub async fn failed_push(&mut self, tables: &Tables) -> Result<Vec<FailedPush>, DbError> {
        let rows = match self {
            Connection::Sqlite(c) => sqlite::failed_push(c, &tables.failed_push).await?,
            Connection::MySql(c) => mysql::failed_push(c, &tables.failed_push).await?,
            #[cfg(feature = "sqlserver")]
            Connection::SqlServer(c) => sqlserver::failed_push(c, &tables.failed_push).await?,
        };
        Ok(retain_failed(rows))
    }

    /// Close the connection. Failures are logged and dropped.
    pub async fn close(self) {
        let res = match self {
            Connection::Sqlite(c) => sqlx::Connection::close(c).await.map_err(DbError::query),
            Connection::MySql(c) => sqlx::Connection::close(c).await.map_err(DbError::query),
            #[cfg(feature = "sqlserver")]
            Connection::SqlServer(c) => c.close().await.map_err(DbError::query),
        };
        if let Err(err) = res {
            warn!(%err, "failed to close database connection");
        }
    }
}

/// Drop rows whose status does not match even though the query filtered on it.
pub(crate) fn retain_failed(rows: Vec<FailedPush>) -> Vec<FailedPush> {
    rows.into_iter()
        .filter(|r| r.field0045 == FAILED_PUSH_STATUS)
        .collect()
}

/// SQL `TRIM` strips only spaces; drop codes made of other whitespace too.
pub(crate) fn retain_nonblank(mut rows: Vec<JobcodeRow>) -> Vec<JobcodeRow> {
    rows.retain(|r| !r.jobcode.trim().is_empty());
    rows
}

/// Settings-bound gateway with a backend fixed at construction.
#[derive(Debug, Clone)]
pub struct Gateway {
    backend: Backend,
    available: bool,
    db: Db,
    tables: Tables,
}

impl Gateway {
    pub fn new(db: &Db, tables: &Tables, drivers: &AvailableDrivers) -> Self {
        Self {
            backend: db.driver,
            available: drivers.supports(db.driver),
            db: db.clone(),
            tables: tables.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.db.connect_timeout()
    }

    /// Open a connection to the configured backend, bounded by the connect timeout.
    #[instrument(skip_all, fields(backend = self.backend.as_str()))]
    pub async fn connect(&self) -> Result<Connection, DbError> {
        if !self.available {
            return Err(DbError::DriverUnavailable(self.backend.as_str()));
        }
        let timeout = self.timeout();
        match self.backend {
            Backend::Sqlite => {
                bounded(self.backend, timeout, sqlite::connect(&self.db.sqlite_path)).await
            }
            Backend::MySql => bounded(self.backend, timeout, mysql::connect(&self.db)).await,
            #[cfg(feature = "sqlserver")]
            Backend::SqlServer => {
                bounded(self.backend, timeout, sqlserver::connect(&self.db)).await
            }
            #[cfg(not(feature = "sqlserver"))]
            Backend::SqlServer => Err(DbError::DriverUnavailable(self.backend.as_str())),
        }
    }
}

async fn bounded<F>(backend: Backend, timeout: Duration, fut: F) -> Result<Connection, DbError>
where
    F: Future<Output = Result<Connection, DbError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(DbError::connection(
            backend,
            format!("timed out after {}s", timeout.as_secs()),
        )),
    }
}

#[async_trait]
impl DatabaseGateway for Gateway {
    fn backend(&self) -> Backend {
        self.backend
    }

    #[instrument(skip_all)]
    async fn duplicate_jobcodes(&self) -> Result<Vec<DuplicateJobcode>, DbError> {
        let mut conn = self.connect().await?;
        let res = conn.duplicate_jobcodes(&self.tables).await;
        conn.close().await;
        res
    }

    #[instrument(skip_all)]
    async fn nonempty_jobcodes(&self) -> Result<Vec<JobcodeRow>, DbError> {
        let mut conn = self.connect().await?;
        let res = conn.nonempty_jobcodes(&self.tables).await;
        conn.close().await;
        res
    }

    #[instrument(skip_all)]
    async fn new_rows(&self, last_id: i64, limit: i64) -> Result<Vec<NewRow>, DbError> {
        let mut conn = self.connect().await?;
        let res = conn.new_rows(&self.tables, last_id, limit).await;
        conn.close().await;
        res
    }

    #[instrument(skip_all)]
    async fn failed_push(&self) -> Result<Vec<FailedPush>, DbError> {
        let mut conn = self.connect().await?;
        let res = conn.failed_push(&self.tables).await;
        conn.close().await;
        res
    }
}
