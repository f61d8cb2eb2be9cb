use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use jobwatch::config;
use jobwatch::db::{AvailableDrivers, DatabaseGateway, Gateway};
use jobwatch::model::Backend;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Check database reachability and run the duplicate-jobcode query"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config/config.yaml")]
    config: PathBuf,

    /// Rows to print from the query result
    #[arg(long, default_value_t = 5)]
    preview: usize,
}

/// TCP reachability only; says nothing about credentials.
async fn port_open(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let settings = config::load(&args.config)?;
    let db = &settings.db;

    if db.driver != Backend::Sqlite {
        let port = db.resolved_port();
        if port_open(&db.host, port, db.connect_timeout()).await {
            info!(host = %db.host, port, "port reachable");
        } else {
            warn!(host = %db.host, port, "port not reachable");
        }
    }

    let drivers = AvailableDrivers::probe();
    let gateway = Gateway::new(db, &settings.tables, &drivers);
    match gateway.duplicate_jobcodes().await {
        Ok(rows) => {
            info!(backend = db.driver.as_str(), rows = rows.len(), "query succeeded");
            for r in rows.iter().take(args.preview) {
                println!("jobcode={} dup_count={}", r.jobcode, r.dup_count);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!(%err, "query failed");
            if err.is_connection() {
                warn!("check the driver build features, network access and credentials");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
