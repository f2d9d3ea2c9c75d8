// src/news_flash/sink.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::feed::FeedItem;
use crate::error::{IngestError, Result};

/// A breaking-news item ready for the accident pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsFlash {
    pub source: String,
    pub title: String,
    pub link: Option<String>,
    pub description: String,
    pub published_at: u64,
    pub accident: bool,
}

impl NewsFlash {
    pub fn from_item(source_id: &str, item: FeedItem) -> Self {
        let accident = is_accident_related(&item.title) || is_accident_related(&item.description);
        Self {
            source: source_id.to_string(),
            title: item.title,
            link: item.link,
            description: item.description,
            published_at: item.published_at,
            accident,
        }
    }
}

/// Road-accident vocabulary (Hebrew stems + English).
const ACCIDENT_KEYWORDS: &[&str] = &[
    "תאונ",
    "התנגש",
    "נפגע",
    "הולך רגל",
    "הולכת רגל",
    "רוכב אופנוע",
    "רוכבת אופנוע",
    "רוכב אופניים",
    "נדרס",
    "התהפך",
    "מד\"א",
    "accident",
    "crash",
    "collision",
    "pedestrian",
    "run over",
];

pub fn is_accident_related(text: &str) -> bool {
    let lower = text.to_lowercase();
    ACCIDENT_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[async_trait]
pub trait FlashSink: Send + Sync {
    async fn store(&self, flashes: Vec<NewsFlash>) -> Result<()>;
}

/// Appends one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlFlashSink {
    path: PathBuf,
}

impl JsonlFlashSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FlashSink for JsonlFlashSink {
    async fn store(&self, flashes: Vec<NewsFlash>) -> Result<()> {
        if flashes.is_empty() {
            return Ok(());
        }
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| IngestError::io(dir, e))?;
        }

        let mut buf = Vec::new();
        for f in &flashes {
            serde_json::to_writer(&mut buf, f)
                .map_err(|e| IngestError::State(format!("serialize flash: {e}")))?;
            buf.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| IngestError::io(&self.path, e))?;
        file.write_all(&buf)
            .await
            .map_err(|e| IngestError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| IngestError::io(&self.path, e))
    }
}

// --- Test helper ---
#[derive(Default)]
pub struct MemoryFlashSink {
    pub calls: std::sync::Mutex<Vec<Vec<NewsFlash>>>,
}

impl MemoryFlashSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Vec<NewsFlash> {
        self.calls
            .lock()
            .map(|c| c.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FlashSink for MemoryFlashSink {
    async fn store(&self, flashes: Vec<NewsFlash>) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| IngestError::State("memory sink poisoned".into()))?
            .push(flashes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_match_is_case_insensitive() {
        assert!(is_accident_related("תאונת דרכים בכביש 1"));
        assert!(is_accident_related("Fatal CRASH near Haifa"));
        assert!(!is_accident_related("הכנסת אישרה את התקציב"));
    }

    #[tokio::test]
    async fn jsonl_sink_appends_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonlFlashSink::new(tmp.path().join("out/flashes.jsonl"));
        let f = NewsFlash {
            source: "ynet".into(),
            title: "תאונה".into(),
            link: None,
            description: String::new(),
            published_at: 1,
            accident: true,
        };
        sink.store(vec![f.clone()]).await.unwrap();
        sink.store(vec![f.clone(), f.clone()]).await.unwrap();
        sink.store(vec![]).await.unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let back: NewsFlash = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(back, f);
    }
}
