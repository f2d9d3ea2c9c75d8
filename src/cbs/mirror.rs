// src/cbs/mirror.rs
use chrono::Datelike;
use metrics::counter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{Category, ObjectStore, LOCAL_CBS_DIRECTORY};
use crate::error::{IngestError, Result};

/// Per-run working directory: `<parent>/cbs-XXXXXX/cbsfiles`.
/// It outlives the process; cleanup belongs to whoever consumes the files.
#[derive(Debug, Clone)]
pub struct LocalWorkDir {
    root: PathBuf,
    files_dir: PathBuf,
}

impl LocalWorkDir {
    /// Create a fresh uniquely-named directory under `parent`.
    pub fn create_in(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
        let root = tempfile::Builder::new()
            .prefix("cbs-")
            .tempdir_in(parent)
            .map_err(|e| IngestError::io(parent, e))?
            .keep();
        Self::at(root)
    }

    /// Use `root` as is (created if absent).
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let files_dir = root.join(LOCAL_CBS_DIRECTORY);
        std::fs::create_dir_all(&files_dir).map_err(|e| IngestError::io(&files_dir, e))?;
        Ok(Self { root, files_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }
}

/// Outcome of one `fetch` call. Transfer failures are collected here
/// instead of aborting the run.
#[derive(Debug, Default)]
pub struct MirrorReport {
    pub listings: usize,
    pub downloaded: Vec<PathBuf>,
    /// Keys with no basename (directory markers).
    pub skipped_keys: Vec<String>,
    pub failures: Vec<IngestError>,
}

impl MirrorReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Last path segment of an object key; `None` for `dir/` markers.
pub fn key_basename(key: &str) -> Option<&str> {
    key.rsplit('/').next().filter(|b| !b.is_empty())
}

pub struct CbsMirror<S> {
    store: S,
    work_dir: LocalWorkDir,
    current_year: i32,
}

impl<S: ObjectStore> CbsMirror<S> {
    /// The current year is read once here and kept for the mirror's lifetime.
    pub fn new(store: S, work_dir: LocalWorkDir) -> Self {
        Self {
            store,
            work_dir,
            current_year: chrono::Local::now().year(),
        }
    }

    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn current_year(&self) -> i32 {
        self.current_year
    }

    pub fn work_dir(&self) -> &LocalWorkDir {
        &self.work_dir
    }

    /// Mirror every object under `accidents_type_<c>/<year>` for each category
    /// and each year in `[start_year, current_year]`.
    ///
    /// Only an authentication failure aborts; listing and download failures
    /// are logged, recorded in the report, and skipped.
    #[tracing::instrument(level = "info", skip(self), fields(current_year = self.current_year))]
    pub async fn fetch(
        &self,
        start_year: i32,
        categories: Option<&[Category]>,
    ) -> Result<MirrorReport> {
        crate::telemetry::ensure_metrics_described();

        let categories = categories.unwrap_or(&Category::KNOWN);
        let mut report = MirrorReport::default();

        if start_year > self.current_year {
            warn!(start_year, "start year is after the current year; nothing to mirror");
        }

        for &category in categories {
            self.download_category(category, start_year, &mut report)
                .await?;
        }

        info!(
            listings = report.listings,
            downloaded = report.downloaded.len(),
            failures = report.failures.len(),
            dir = %self.work_dir.files_dir().display(),
            "cbs mirror finished"
        );
        Ok(report)
    }

    async fn download_category(
        &self,
        category: Category,
        start_year: i32,
        report: &mut MirrorReport,
    ) -> Result<()> {
        for year in start_year..=self.current_year {
            let prefix = category.year_prefix(year);

            report.listings += 1;
            counter!("cbs_listings_total").increment(1);
            let keys = match self.store.list_keys(&prefix).await {
                Ok(keys) => keys,
                Err(e @ IngestError::Authentication(_)) => return Err(e),
                Err(e) => {
                    warn!(%prefix, error = %e, "listing failed; skipping prefix");
                    counter!("cbs_transfer_errors_total").increment(1);
                    report.failures.push(e);
                    continue;
                }
            };
            debug!(%prefix, count = keys.len(), "listed cbs objects");

            for key in keys {
                let Some(name) = key_basename(&key) else {
                    debug!(%key, "directory marker; skipping");
                    report.skipped_keys.push(key);
                    continue;
                };
                let dest = self.work_dir.files_dir().join(name);

                match self.store.download_to(&key, &dest).await {
                    Ok(()) => {
                        debug!(%key, dest = %dest.display(), "downloaded");
                        counter!("cbs_objects_downloaded_total").increment(1);
                        report.downloaded.push(dest);
                    }
                    Err(e @ IngestError::Authentication(_)) => return Err(e),
                    Err(e) => {
                        warn!(%key, error = %e, "download failed; skipping object");
                        counter!("cbs_transfer_errors_total").increment(1);
                        report.failures.push(e);
                    }
                }
            }
        }
        Ok(())
    }
}
