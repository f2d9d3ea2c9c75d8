// src/news_flash/mod.rs
//! Breaking-news ingestion: ynet RSS, walla breaking page, MDA twitter account.

pub mod dispatch;
pub mod feed;
pub mod novelty;
pub mod parser;
pub mod sink;
pub mod social;
pub mod source;

pub use dispatch::{run, run_selected, DispatchOutcome, Dispatcher, RunReport};
pub use source::FlashSource;

use std::sync::Arc;
use std::time::Duration;

use crate::config::NewsFlashConfig;
use crate::error::Result;
use feed::{FeedReader, HttpFeedReader};
use novelty::{FeedNovelty, MarkerStore};
use parser::FeedFlashParser;
use sink::{FlashSink, JsonlFlashSink};
use social::TwitterIngest;

/// Wire the production dispatcher: HTTP reader, JSON marker file, JSONL sink.
pub fn build_dispatcher(cfg: &NewsFlashConfig) -> Result<Dispatcher> {
    let timeout = Duration::from_secs(cfg.http_timeout_secs);
    let reader: Arc<dyn FeedReader> = Arc::new(HttpFeedReader::new(timeout)?);
    let sink: Arc<dyn FlashSink> = Arc::new(JsonlFlashSink::new(&cfg.output_path));
    let markers = MarkerStore::new(&cfg.state_path);

    let novelty = FeedNovelty::new(reader.clone(), markers.clone());
    let parser = FeedFlashParser::new(reader, sink.clone());
    let social = TwitterIngest::new(
        cfg.twitter_account.clone(),
        cfg.twitter_bearer_token.clone(),
        markers,
        sink,
        timeout,
    )?;

    Ok(Dispatcher::new(
        Arc::new(novelty),
        Arc::new(parser),
        Arc::new(social),
    ))
}
