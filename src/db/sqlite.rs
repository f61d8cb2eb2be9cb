use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Row, SqliteConnection};
use std::path::Path;
use tracing::{info, instrument};

use super::{Connection, DbError};
use crate::config::Tables;
use crate::model::{Backend, DuplicateJobcode, FailedPush, JobcodeRow, NewRow};

/// Open the database file, creating it and its parent directory if missing.
pub async fn connect(path: &str) -> Result<Connection, DbError> {
    open(path).await.map(Connection::Sqlite)
}

async fn open(path: &str) -> Result<SqliteConnection, DbError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DbError::connection(Backend::Sqlite, e))?;
        }
    }
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .connect()
        .await
        .map_err(|e| DbError::connection(Backend::Sqlite, e))
}

pub async fn duplicate_jobcodes(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Vec<DuplicateJobcode>, DbError> {
    let sql = format!(
        "SELECT COUNT(jobcode) AS dup_count, jobcode FROM {table} \
         GROUP BY jobcode HAVING COUNT(jobcode) > 1 ORDER BY jobcode DESC"
    );
    let rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::query)?;
    rows.iter()
        .map(|r| {
            Ok(DuplicateJobcode {
                jobcode: r.try_get("jobcode").map_err(DbError::query)?,
                dup_count: r.try_get("dup_count").map_err(DbError::query)?,
            })
        })
        .collect()
}

pub async fn nonempty_jobcodes(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Vec<JobcodeRow>, DbError> {
    let sql = format!(
        "SELECT DISTINCT jobcode FROM {table} \
         WHERE jobcode IS NOT NULL AND TRIM(jobcode) <> '' ORDER BY jobcode ASC"
    );
    let codes: Vec<String> = sqlx::query_scalar(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::query)?;
    Ok(codes.into_iter().map(|jobcode| JobcodeRow { jobcode }).collect())
}

pub async fn new_rows(
    conn: &mut SqliteConnection,
    table: &str,
    last_id: i64,
    limit: i64,
) -> Result<Vec<NewRow>, DbError> {
    let sql = format!(
        "SELECT id, title, created_at FROM {table} WHERE id > ? ORDER BY id ASC LIMIT ?"
    );
    let rows = sqlx::query(&sql)
        .bind(last_id)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::query)?;
    rows.iter()
        .map(|r| {
            Ok(NewRow {
                id: r.try_get("id").map_err(DbError::query)?,
                title: r
                    .try_get::<Option<String>, _>("title")
                    .map_err(DbError::query)?
                    .unwrap_or_default(),
                created_at: r
                    .try_get::<Option<String>, _>("created_at")
                    .map_err(DbError::query)?
                    .unwrap_or_default(),
            })
        })
        .collect()
}

pub async fn failed_push(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Vec<FailedPush>, DbError> {
    let sql = format!(
        "SELECT CAST(field0001 AS TEXT) AS field0001, CAST(field0045 AS TEXT) AS field0045 \
         FROM {table} WHERE CAST(field0045 AS TEXT) = ?"
    );
    let rows = sqlx::query(&sql)
        .bind(super::FAILED_PUSH_STATUS)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::query)?;
    rows.iter()
        .map(|r| {
            Ok(FailedPush {
                field0001: r
                    .try_get::<Option<String>, _>("field0001")
                    .map_err(DbError::query)?
                    .unwrap_or_default(),
                field0045: r
                    .try_get::<Option<String>, _>("field0045")
                    .map_err(DbError::query)?
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Create the demo tables and seed them: one alert, and the jobcodes
/// `JC-999`, `JC-999`, `JC-ABC`.
#[instrument(skip_all, fields(path = %path))]
pub async fn init_demo(path: &str, tables: &Tables) -> Result<(), DbError> {
    let mut conn = open(path).await?;
    let res = seed_demo(&mut conn, tables).await;
    if let Err(err) = sqlx::Connection::close(conn).await {
        tracing::warn!(%err, "failed to close demo database");
    }
    res?;
    info!("demo tables initialised");
    Ok(())
}

async fn seed_demo(conn: &mut SqliteConnection, tables: &Tables) -> Result<(), DbError> {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT, created_at TEXT)",
            tables.alerts
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, jobcode TEXT, created_at TEXT)",
            tables.jobcode
        ),
    ];
    for sql in &statements {
        sqlx::query(sql)
            .execute(&mut *conn)
            .await
            .map_err(DbError::query)?;
    }

    sqlx::query(&format!(
        "INSERT INTO {}(title, created_at) VALUES(?, ?)",
        tables.alerts
    ))
    .bind(format!("示例告警 - {now}"))
    .bind(&now)
    .execute(&mut *conn)
    .await
    .map_err(DbError::query)?;

    let insert = format!("INSERT INTO {}(jobcode, created_at) VALUES(?, ?)", tables.jobcode);
    for code in ["JC-999", "JC-999", "JC-ABC"] {
        sqlx::query(&insert)
            .bind(code)
            .bind(&now)
            .execute(&mut *conn)
            .await
            .map_err(DbError::query)?;
    }
    Ok(())
}
