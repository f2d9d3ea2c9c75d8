// src/telemetry.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins; default is `info`.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(true))
            .init();
    }
}

/// One-time metrics registration (so series show up in the exposition).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "cbs_listings_total",
            "Prefix listings issued against the CBS bucket."
        );
        describe_counter!(
            "cbs_objects_downloaded_total",
            "CBS objects written to the local working directory."
        );
        describe_counter!(
            "cbs_transfer_errors_total",
            "Failed CBS listings or downloads (skipped)."
        );
        describe_counter!(
            "news_flash_dispatch_total",
            "Source dispatches by outcome (skipped/processed)."
        );
        describe_counter!(
            "news_flash_source_errors_total",
            "Source dispatches that failed."
        );
        describe_counter!(
            "news_flash_stored_total",
            "News flashes handed to the sink."
        );
        describe_histogram!(
            "news_flash_feed_parse_ms",
            "Feed body parse time in milliseconds."
        );
    });
}

/// Prometheus recorder for batch runs; rendered to a textfile at exit.
pub struct MetricsTextfile {
    handle: PrometheusHandle,
}

impl MetricsTextfile {
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        std::fs::write(path, self.render())
            .with_context(|| format!("writing metrics to {}", path.display()))
    }
}
