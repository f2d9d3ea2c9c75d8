// src/news_flash/dispatch.rs
use metrics::counter;
use std::sync::Arc;
use tracing::{info, warn};

use super::novelty::NoveltyCheck;
use super::parser::FlashParser;
use super::social::SocialIngest;
use super::source::FlashSource;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Novelty check said nothing changed.
    Skipped,
    /// Parser or social ingest ran; `stored` flashes went to the sink.
    Processed { stored: usize },
}

impl DispatchOutcome {
    fn label(self) -> &'static str {
        match self {
            DispatchOutcome::Skipped => "skipped",
            DispatchOutcome::Processed { .. } => "processed",
        }
    }
}

pub struct Dispatcher {
    novelty: Arc<dyn NoveltyCheck>,
    parser: Arc<dyn FlashParser>,
    social: Arc<dyn SocialIngest>,
}

impl Dispatcher {
    pub fn new(
        novelty: Arc<dyn NoveltyCheck>,
        parser: Arc<dyn FlashParser>,
        social: Arc<dyn SocialIngest>,
    ) -> Self {
        Self {
            novelty,
            parser,
            social,
        }
    }

    /// Feed sources are gated by the novelty check; the social source always runs.
    #[tracing::instrument(level = "info", skip(self, maps_key))]
    pub async fn dispatch(&self, source: FlashSource, maps_key: &str) -> Result<DispatchOutcome> {
        let outcome = match source.feed_url() {
            // twitter: no feed, no gating
            None => {
                let stored = self.social.ingest().await?;
                DispatchOutcome::Processed { stored }
            }
            Some(url) => {
                if self.novelty.is_new(url, source.id()).await? {
                    let stored = self.parser.parse(url, source.id(), maps_key).await?;
                    DispatchOutcome::Processed { stored }
                } else {
                    DispatchOutcome::Skipped
                }
            }
        };

        counter!("news_flash_dispatch_total", "source" => source.id(), "outcome" => outcome.label())
            .increment(1);
        Ok(outcome)
    }
}

/// Per-source results of one `run`, in dispatch order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<(FlashSource, Result<DispatchOutcome>)>,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = FlashSource> + '_ {
        self.results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(s, _)| *s)
    }

    pub fn is_clean(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Dispatch ynet, walla, twitter in order. A failing source is logged and
/// recorded; the remaining sources still run.
pub async fn run(dispatcher: &Dispatcher, maps_key: &str) -> RunReport {
    run_selected(dispatcher, &FlashSource::ALL, maps_key).await
}

/// Like [`run`] restricted to `selected`. Sources still go in the fixed
/// order whatever order `selected` lists them in.
pub async fn run_selected(
    dispatcher: &Dispatcher,
    selected: &[FlashSource],
    maps_key: &str,
) -> RunReport {
    crate::telemetry::ensure_metrics_described();

    let mut report = RunReport::default();
    for source in FlashSource::ALL.into_iter().filter(|s| selected.contains(s)) {
        let res = dispatcher.dispatch(source, maps_key).await;
        match &res {
            Ok(outcome) => info!(%source, ?outcome, "source dispatched"),
            Err(e) => {
                warn!(%source, error = %e, kind = e.kind(), "source failed; continuing");
                counter!("news_flash_source_errors_total", "source" => source.id()).increment(1);
            }
        }
        report.results.push((source, res));
    }
    report
}
