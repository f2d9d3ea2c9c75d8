// src/news_flash/novelty.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use super::feed::{FeedItem, FeedReader};
use crate::error::{IngestError, Result};

/// Last-seen state for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    /// sha256 hex of the representative item id (or a raw cursor such as a tweet id)
    pub fingerprint: String,
    #[serde(default)]
    pub title: String,
    pub seen_at: DateTime<Utc>,
}

pub fn fingerprint(item: &FeedItem) -> String {
    let mut h = Sha256::new();
    h.update(item.id.as_bytes());
    format!("{:x}", h.finalize())
}

/// JSON object `{ "<source_id>": Marker, ... }` on disk.
/// Read-then-write per call; not safe for concurrent processes.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    path: PathBuf,
}

impl MarkerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, Marker>> {
        match fs::read_to_string(&self.path).await {
            Ok(s) if s.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(s) => serde_json::from_str(&s).map_err(|e| {
                IngestError::State(format!("{} is not valid marker json: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(IngestError::io(&self.path, e)),
        }
    }

    pub async fn get(&self, source_id: &str) -> Result<Option<Marker>> {
        Ok(self.read_all().await?.remove(source_id))
    }

    pub async fn set(&self, source_id: &str, marker: Marker) -> Result<()> {
        let mut all = self.read_all().await?;
        all.insert(source_id.to_string(), marker);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| IngestError::io(dir, e))?;
        }
        let body = serde_json::to_vec_pretty(&all)
            .map_err(|e| IngestError::State(format!("serialize markers: {e}")))?;
        fs::write(&self.path, body)
            .await
            .map_err(|e| IngestError::io(&self.path, e))
    }
}

/// "Has this feed changed since we last looked?" Advances the marker on `true`.
#[async_trait]
pub trait NoveltyCheck: Send + Sync {
    async fn is_new(&self, feed_url: &str, source_id: &str) -> Result<bool>;
}

/// Compares the first feed item against the stored marker.
pub struct FeedNovelty {
    reader: Arc<dyn FeedReader>,
    store: MarkerStore,
}

impl FeedNovelty {
    pub fn new(reader: Arc<dyn FeedReader>, store: MarkerStore) -> Self {
        Self { reader, store }
    }
}

#[async_trait]
impl NoveltyCheck for FeedNovelty {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn is_new(&self, feed_url: &str, source_id: &str) -> Result<bool> {
        let items = self.reader.fetch(feed_url).await?;
        let Some(latest) = items.first() else {
            tracing::debug!("feed is empty; nothing new");
            return Ok(false);
        };

        let fp = fingerprint(latest);
        let previous = self.store.get(source_id).await?;
        if previous.as_ref().is_some_and(|m| m.fingerprint == fp) {
            tracing::trace!(title = %latest.title, "no change");
            return Ok(false);
        }

        self.store
            .set(
                source_id,
                Marker {
                    fingerprint: fp,
                    title: latest.title.clone(),
                    seen_at: Utc::now(),
                },
            )
            .await?;
        tracing::info!(
            title = %latest.title,
            first_seen = previous.is_none(),
            "new flash content"
        );
        Ok(true)
    }
}
