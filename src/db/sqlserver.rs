use tiberius::{AuthMethod, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{Connection, DbError, FAILED_PUSH_STATUS};
use crate::config::Db;
use crate::model::{Backend, DuplicateJobcode, FailedPush, JobcodeRow, NewRow};

pub type Client = tiberius::Client<Compat<TcpStream>>;

pub async fn connect(db: &Db) -> Result<Connection, DbError> {
    let mut config = Config::new();
    config.host(&db.host);
    config.port(db.resolved_port());
    if !db.database.is_empty() {
        config.database(&db.database);
    }
    config.authentication(AuthMethod::sql_server(&db.user, &db.password));
    config.trust_cert();

    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| DbError::connection(Backend::SqlServer, e))?;
    tcp.set_nodelay(true)
        .map_err(|e| DbError::connection(Backend::SqlServer, e))?;
    let client = tiberius::Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| DbError::connection(Backend::SqlServer, e))?;
    Ok(Connection::SqlServer(client))
}

fn text(row: &tiberius::Row, col: &str) -> Result<String, DbError> {
    Ok(row
        .try_get::<&str, _>(col)
        .map_err(DbError::query)?
        .unwrap_or_default()
        .to_string())
}

pub async fn duplicate_jobcodes(
    client: &mut Client,
    table: &str,
) -> Result<Vec<DuplicateJobcode>, DbError> {
    let sql = format!(
        "SELECT CAST(COUNT(jobcode) AS BIGINT) AS dup_count, jobcode FROM {table} \
         GROUP BY jobcode HAVING COUNT(jobcode) > 1 ORDER BY jobcode DESC"
    );
    let rows = client
        .simple_query(sql)
        .await
        .map_err(DbError::query)?
        .into_first_result()
        .await
        .map_err(DbError::query)?;
    rows.iter()
        .map(|r| {
            Ok(DuplicateJobcode {
                jobcode: text(r, "jobcode")?,
                dup_count: r
                    .try_get::<i64, _>("dup_count")
                    .map_err(DbError::query)?
                    .unwrap_or_default(),
            })
        })
        .collect()
}

pub async fn nonempty_jobcodes(
    client: &mut Client,
    table: &str,
) -> Result<Vec<JobcodeRow>, DbError> {
    let sql = format!(
        "SELECT DISTINCT jobcode FROM {table} \
         WHERE jobcode IS NOT NULL AND LTRIM(RTRIM(jobcode)) <> '' ORDER BY jobcode ASC"
    );
    let rows = client
        .simple_query(sql)
        .await
        .map_err(DbError::query)?
        .into_first_result()
        .await
        .map_err(DbError::query)?;
    rows.iter()
        .map(|r| {
            Ok(JobcodeRow {
                jobcode: text(r, "jobcode")?,
            })
        })
        .collect()
}

pub async fn new_rows(
    client: &mut Client,
    table: &str,
    last_id: i64,
    limit: i64,
) -> Result<Vec<NewRow>, DbError> {
    let sql = format!(
        "SELECT TOP (@P2) CAST(id AS BIGINT) AS id, CAST(title AS NVARCHAR(4000)) AS title, \
         CONVERT(NVARCHAR(19), created_at, 120) AS created_at \
         FROM {table} WHERE id > @P1 ORDER BY id ASC"
    );
    let rows = client
        .query(sql, &[&last_id, &limit])
        .await
        .map_err(DbError::query)?
        .into_first_result()
        .await
        .map_err(DbError::query)?;
    rows.iter()
        .map(|r| {
            Ok(NewRow {
                id: r
                    .try_get::<i64, _>("id")
                    .map_err(DbError::query)?
                    .unwrap_or_default(),
                title: text(r, "title")?,
                created_at: text(r, "created_at")?,
            })
        })
        .collect()
}

pub async fn failed_push(
    client: &mut Client,
    table: &str,
) -> Result<Vec<FailedPush>, DbError> {
    let sql = format!(
        "SELECT CAST(field0001 AS NVARCHAR(255)) AS field0001, \
         CAST(field0045 AS NVARCHAR(255)) AS field0045 FROM {table} WHERE field0045 = @P1"
    );
    let rows = client
        .query(sql, &[&FAILED_PUSH_STATUS])
        .await
        .map_err(DbError::query)?
        .into_first_result()
        .await
        .map_err(DbError::query)?;
    rows.iter()
        .map(|r| {
            Ok(FailedPush {
                field0001: text(r, "field0001")?,
                field0045: text(r, "field0045")?,
            })
        })
        .collect()
}
