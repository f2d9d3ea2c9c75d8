// src/news_flash/parser.rs
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;

use super::feed::FeedReader;
use super::sink::{FlashSink, NewsFlash};
use crate::error::{IngestError, Result};

/// Turns a feed page into stored flashes. Returns how many were stored.
///
/// `maps_key` is passed through for geocoding downstream; it is never inspected.
#[async_trait]
pub trait FlashParser: Send + Sync {
    async fn parse(&self, url: &str, source_id: &str, maps_key: &str) -> Result<usize>;
}

pub struct FeedFlashParser {
    reader: Arc<dyn FeedReader>,
    sink: Arc<dyn FlashSink>,
}

impl FeedFlashParser {
    pub fn new(reader: Arc<dyn FeedReader>, sink: Arc<dyn FlashSink>) -> Self {
        Self { reader, sink }
    }
}

#[async_trait]
impl FlashParser for FeedFlashParser {
    #[tracing::instrument(level = "info", skip(self, maps_key), fields(maps_key_len = maps_key.len()))]
    async fn parse(&self, url: &str, source_id: &str, maps_key: &str) -> Result<usize> {
        let items = self
            .reader
            .fetch(url)
            .await
            .map_err(|e| IngestError::parse(source_id, e))?;
        let total = items.len();

        let flashes: Vec<NewsFlash> = items
            .into_iter()
            .map(|it| NewsFlash::from_item(source_id, it))
            .filter(|f| f.accident)
            .collect();
        let kept = flashes.len();

        self.sink.store(flashes).await?;
        counter!("news_flash_stored_total").increment(kept as u64);

        tracing::info!(total, kept, "parsed news flashes");
        Ok(kept)
    }
}
