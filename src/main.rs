//! anyway-ingest batch entrypoint.
//! `cbs` mirrors the CBS accident files from S3; `news-flash` runs the
//! ynet/walla/twitter dispatch once.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use anyway_ingest::cbs::{CbsMirror, Category, LocalWorkDir, S3ObjectStore};
use anyway_ingest::news_flash::{self, FlashSource};
use anyway_ingest::telemetry::{self, MetricsTextfile};
use anyway_ingest::config;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Write Prometheus metrics to this file on exit
    #[arg(long, global = true)]
    metrics_textfile: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror CBS files for [start-year, current year]
    Cbs {
        #[arg(long)]
        start_year: i32,

        /// Accident type; repeat for several. Defaults to 1 and 3.
        #[arg(long = "category")]
        categories: Vec<Category>,
    },
    /// Dispatch ynet, walla and twitter once
    NewsFlash {
        /// Google Maps key handed to the flash parser
        #[arg(long, env = "GOOGLE_MAPS_KEY", hide_env_values = true)]
        maps_key: String,

        /// Only these sources (ynet, walla, twitter); repeat for several. Defaults to all.
        #[arg(long = "source")]
        sources: Vec<FlashSource>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json);

    let metrics = match &cli.metrics_textfile {
        Some(_) => Some(MetricsTextfile::install()?),
        None => None,
    };

    let cfg = config::load_default().context("loading ingest config")?;
    tracing::debug!(?cfg, "config resolved");

    let outcome = match cli.command {
        Command::Cbs {
            start_year,
            categories,
        } => run_cbs(&cfg, start_year, categories).await,
        Command::NewsFlash { maps_key, sources } => run_news_flash(&cfg, &maps_key, sources).await,
    };

    if let (Some(m), Some(path)) = (&metrics, &cli.metrics_textfile) {
        if let Err(e) = m.write_to(path) {
            warn!(error = %e, "could not write metrics textfile");
        }
    }
    outcome
}

async fn run_cbs(cfg: &config::AppConfig, start_year: i32, categories: Vec<Category>) -> Result<()> {
    let store = S3ObjectStore::new(&cfg.cbs).await;
    info!(bucket = store.bucket(), start_year, "mirroring cbs files");
    let work_dir = LocalWorkDir::create_in(&cfg.cbs.temp_root())?;
    let mirror = CbsMirror::new(store, work_dir);

    let chosen = (!categories.is_empty()).then_some(categories.as_slice());
    let report = mirror.fetch(start_year, chosen).await?;

    info!(
        dir = %mirror.work_dir().files_dir().display(),
        downloaded = report.downloaded.len(),
        "cbs files ready"
    );
    if !report.is_clean() {
        for e in &report.failures {
            warn!(error = %e, "cbs transfer failure");
        }
        bail!("{} cbs transfer(s) failed", report.failures.len());
    }
    Ok(())
}

async fn run_news_flash(
    cfg: &config::AppConfig,
    maps_key: &str,
    sources: Vec<FlashSource>,
) -> Result<()> {
    let dispatcher = news_flash::build_dispatcher(&cfg.news_flash)?;
    let report = if sources.is_empty() {
        news_flash::run(&dispatcher, maps_key).await
    } else {
        news_flash::run_selected(&dispatcher, &sources, maps_key).await
    };

    let failed: Vec<_> = report.failed().map(|s| s.id()).collect();
    if !failed.is_empty() {
        bail!("news-flash sources failed: {}", failed.join(", "));
    }
    Ok(())
}
