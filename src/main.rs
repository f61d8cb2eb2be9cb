use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jobwatch::compose::{Composer, DEFAULT_MAX_PREVIEW};
use jobwatch::config;
use jobwatch::db::{AvailableDrivers, DatabaseGateway, Gateway};
use jobwatch::notify::{Channel, ChannelDelivery, Delivery, DryRun};
use jobwatch::pipeline::{self, RunOutcome, Sources};

#[derive(Debug, Parser)]
#[command(author, version, about = "Query a database and notify WeCom when rows match")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config/config.yaml")]
    config: PathBuf,

    /// Watermark file for the new-rows flow
    #[arg(long, default_value = "state/last_seen.json")]
    state: PathBuf,

    /// Maximum rows fetched per run by the new-rows flow
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(i64).range(1..))]
    limit: i64,

    /// Rows listed in the message before the "omitted" footer
    #[arg(long, default_value_t = DEFAULT_MAX_PREVIEW)]
    preview: usize,

    /// Print the message instead of sending it
    #[arg(long)]
    dry_run: bool,

    /// Create and seed the demo SQLite tables first
    #[arg(long)]
    init_demo: bool,

    /// Report rows past the watermark instead of jobcodes / failed pushes
    #[arg(long)]
    new_rows: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let settings = config::load(&args.config)?;

    if args.init_demo {
        pipeline::init_demo(&settings).await?;
    }

    let drivers = AvailableDrivers::probe();
    let primary = Gateway::new(&settings.db, &settings.tables, &drivers);
    let secondary = settings
        .secondary()
        .map(|m| Gateway::new(&m.as_db(settings.db.connect_timeout_secs), &settings.tables, &drivers));

    let channel = Channel::select(&settings);
    let format = channel.format();
    info!(channel = channel.name(), ?format, dry_run = args.dry_run, "delivery channel selected");
    let delivery: Box<dyn Delivery> = if args.dry_run {
        Box::new(DryRun)
    } else {
        Box::new(ChannelDelivery::new(channel)?)
    };
    let composer = Composer::new(&settings.message, args.preview);

    let outcome = if args.new_rows {
        pipeline::run_new_rows(
            &primary,
            &composer,
            format,
            delivery.as_ref(),
            &args.state,
            args.limit,
            !args.dry_run,
        )
        .await?
    } else {
        let sources = Sources {
            primary: &primary,
            secondary: secondary.as_ref().map(|g| g as &dyn DatabaseGateway),
        };
        pipeline::run(sources, &composer, format, delivery.as_ref()).await?
    };

    match outcome {
        RunOutcome::NothingToSend => info!("nothing to send, done"),
        RunOutcome::Delivered { sources } if args.dry_run => {
            info!(sources, "dry run finished, nothing was sent")
        }
        RunOutcome::Delivered { sources } => info!(sources, "run finished"),
    }
    Ok(())
}
