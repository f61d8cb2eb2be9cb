//! One run: query the configured sources, compose, deliver once.
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::compose::Composer;
use crate::config::Settings;
use crate::db::{self, DatabaseGateway, DbError};
use crate::model::{Backend, OutputFormat};
use crate::notify::Delivery;
use crate::state;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    NothingToSend,
    Delivered { sources: usize },
}

/// Gateways queried by one run. The secondary source is best-effort.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub primary: &'a dyn DatabaseGateway,
    pub secondary: Option<&'a dyn DatabaseGateway>,
}

/// Seed the demo SQLite tables. Returns false for other drivers.
pub async fn init_demo(settings: &Settings) -> Result<bool> {
    if settings.db.driver != Backend::Sqlite {
        warn!(driver = settings.db.driver.as_str(), "--init-demo only applies to sqlite");
        return Ok(false);
    }
    db::sqlite::init_demo(&settings.db.sqlite_path, &settings.tables)
        .await
        .context("failed to initialise demo database")?;
    Ok(true)
}

/// Primary listing: jobcodes for sqlite/sqlserver, failed pushes for mysql.
async fn primary_message(
    gw: &dyn DatabaseGateway,
    composer: &Composer<'_>,
    format: OutputFormat,
) -> Result<Option<String>, DbError> {
    match gw.backend() {
        Backend::Sqlite | Backend::SqlServer => {
            let rows = gw.nonempty_jobcodes().await?;
            info!(backend = gw.backend().as_str(), rows = rows.len(), "jobcodes queried");
            Ok(composer.compose(&rows, format))
        }
        Backend::MySql => failed_push_message(gw, composer, format).await,
    }
}

async fn failed_push_message(
    gw: &dyn DatabaseGateway,
    composer: &Composer<'_>,
    format: OutputFormat,
) -> Result<Option<String>, DbError> {
    let rows = gw.failed_push().await?;
    info!(backend = gw.backend().as_str(), rows = rows.len(), "failed pushes queried");
    Ok(composer.compose(&rows, format))
}

/// Query every source, join the non-empty messages with a blank line and
/// deliver them in a single call.
#[instrument(skip_all)]
pub async fn run(
    sources: Sources<'_>,
    composer: &Composer<'_>,
    format: OutputFormat,
    delivery: &dyn Delivery,
) -> Result<RunOutcome> {
    let mut messages = Vec::new();

    if let Some(msg) = primary_message(sources.primary, composer, format)
        .await
        .context("primary source query failed")?
    {
        messages.push(msg);
    }

    if let Some(secondary) = sources.secondary {
        match failed_push_message(secondary, composer, format).await {
            Ok(Some(msg)) => messages.push(msg),
            Ok(None) => {}
            Err(err) => warn!(%err, "secondary source failed, continuing without it"),
        }
    }

    if messages.is_empty() {
        info!("no matching rows, nothing to send");
        return Ok(RunOutcome::NothingToSend);
    }

    let parts = messages.len();
    delivery
        .deliver(&messages.join("\n\n"))
        .await
        .context("failed to deliver message")?;
    info!(sources = parts, "message delivered");
    Ok(RunOutcome::Delivered { sources: parts })
}

/// Notify rows past the stored watermark. The watermark only moves forward,
/// and only when `advance` is set and delivery succeeded.
#[instrument(skip_all, fields(limit = limit))]
pub async fn run_new_rows(
    gw: &dyn DatabaseGateway,
    composer: &Composer<'_>,
    format: OutputFormat,
    delivery: &dyn Delivery,
    state_path: &Path,
    limit: i64,
    advance: bool,
) -> Result<RunOutcome> {
    let last_id = state::load_watermark(state_path);
    let rows = gw
        .new_rows(last_id, limit)
        .await
        .context("new rows query failed")?;
    info!(last_id, rows = rows.len(), "new rows queried");

    let Some(msg) = composer.compose(&rows, format) else {
        info!("no new rows, nothing to send");
        return Ok(RunOutcome::NothingToSend);
    };
    delivery
        .deliver(&msg)
        .await
        .context("failed to deliver message")?;

    if advance {
        let next = rows.iter().map(|r| r.id).fold(last_id, i64::max);
        state::save_watermark(state_path, next)
            .with_context(|| format!("failed to save watermark to {}", state_path.display()))?;
        info!(last_id = next, "watermark advanced");
    }
    Ok(RunOutcome::Delivered { sources: 1 })
}
