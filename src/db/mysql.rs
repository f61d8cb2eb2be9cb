use sqlx::mysql::MySqlConnectOptions;
use sqlx::{ConnectOptions, MySqlConnection, Row};

use super::{Connection, DbError, FAILED_PUSH_STATUS};
use crate::config::Db;
use crate::model::{Backend, DuplicateJobcode, FailedPush, JobcodeRow, NewRow};

pub async fn connect(db: &Db) -> Result<Connection, DbError> {
    let mut opts = MySqlConnectOptions::new()
        .host(&db.host)
        .port(db.resolved_port())
        .username(&db.user)
        .password(&db.password)
        .charset("utf8mb4");
    if !db.database.is_empty() {
        opts = opts.database(&db.database);
    }
    opts.connect()
        .await
        .map(Connection::MySql)
        .map_err(|e| DbError::connection(Backend::MySql, e))
}

pub async fn duplicate_jobcodes(
    conn: &mut MySqlConnection,
    table: &str,
) -> Result<Vec<DuplicateJobcode>, DbError> {
    let sql = format!(
        "SELECT CAST(COUNT(jobcode) AS SIGNED) AS dup_count, jobcode FROM {table} \
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
    conn: &mut MySqlConnection,
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
    conn: &mut MySqlConnection,
    table: &str,
    last_id: i64,
    limit: i64,
) -> Result<Vec<NewRow>, DbError> {
    let sql = format!(
        "SELECT CAST(id AS SIGNED) AS id, CAST(title AS CHAR) AS title, \
         CAST(created_at AS CHAR) AS created_at \
         FROM {table} WHERE id > ? ORDER BY id ASC LIMIT ?"
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
    conn: &mut MySqlConnection,
    table: &str,
) -> Result<Vec<FailedPush>, DbError> {
    let sql = format!(
        "SELECT CAST(field0001 AS CHAR) AS field0001, CAST(field0045 AS CHAR) AS field0045 \
         FROM {table} WHERE field0045 = ?"
    );
    let rows = sqlx::query(&sql)
        .bind(FAILED_PUSH_STATUS)
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
