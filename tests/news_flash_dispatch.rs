// tests/news_flash_dispatch.rs
use anyway_ingest::news_flash::novelty::NoveltyCheck;
use anyway_ingest::news_flash::parser::FlashParser;
use anyway_ingest::news_flash::social::SocialIngest;
use anyway_ingest::news_flash::source::{WALLA_BREAKING_URL, YNET_RSS_URL};
use anyway_ingest::news_flash::{run, run_selected, DispatchOutcome, Dispatcher, FlashSource};
use anyway_ingest::{IngestError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-source canned answers; missing source means "not new".
#[derive(Default)]
struct FakeNovelty {
    answers: HashMap<&'static str, std::result::Result<bool, &'static str>>,
    calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl NoveltyCheck for FakeNovelty {
    async fn is_new(&self, feed_url: &str, source_id: &str) -> Result<bool> {
        self.calls
            .lock()
            .push((feed_url.to_string(), source_id.to_string()));
        match self.answers.get(source_id) {
            Some(Ok(b)) => Ok(*b),
            Some(Err(msg)) => Err(IngestError::fetch(feed_url, msg)),
            None => Ok(false),
        }
    }
}

#[derive(Default)]
struct RecordingParser {
    calls: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl FlashParser for RecordingParser {
    async fn parse(&self, url: &str, source_id: &str, maps_key: &str) -> Result<usize> {
        self.calls
            .lock()
            .push((url.to_string(), source_id.to_string(), maps_key.to_string()));
        Ok(2)
    }
}

#[derive(Default)]
struct CountingSocial {
    calls: Mutex<usize>,
    fail: bool,
}

#[async_trait]
impl SocialIngest for CountingSocial {
    async fn ingest(&self) -> Result<usize> {
        *self.calls.lock() += 1;
        if self.fail {
            return Err(IngestError::fetch("https://api.twitter.com", "401 Unauthorized"));
        }
        Ok(1)
    }
}

struct Harness {
    novelty: Arc<FakeNovelty>,
    parser: Arc<RecordingParser>,
    social: Arc<CountingSocial>,
    dispatcher: Dispatcher,
}

fn harness(novelty: FakeNovelty, social: CountingSocial) -> Harness {
    let novelty = Arc::new(novelty);
    let parser = Arc::new(RecordingParser::default());
    let social = Arc::new(social);
    let dispatcher = Dispatcher::new(novelty.clone(), parser.clone(), social.clone());
    Harness {
        novelty,
        parser,
        social,
        dispatcher,
    }
}

#[tokio::test]
async fn unchanged_feed_is_skipped_without_parsing() {
    let h = harness(FakeNovelty::default(), CountingSocial::default());

    let out = h.dispatcher.dispatch(FlashSource::Ynet, "KEY").await.unwrap();

    assert_eq!(out, DispatchOutcome::Skipped);
    assert_eq!(
        *h.novelty.calls.lock(),
        [(YNET_RSS_URL.to_string(), "ynet".to_string())]
    );
    assert!(h.parser.calls.lock().is_empty());
}

#[tokio::test]
async fn new_feed_content_triggers_exactly_one_parse() {
    let mut novelty = FakeNovelty::default();
    novelty.answers.insert("walla", Ok(true));
    let h = harness(novelty, CountingSocial::default());

    let out = h.dispatcher.dispatch(FlashSource::Walla, "KEY").await.unwrap();

    assert_eq!(out, DispatchOutcome::Processed { stored: 2 });
    assert_eq!(
        *h.parser.calls.lock(),
        [(
            WALLA_BREAKING_URL.to_string(),
            "walla".to_string(),
            "KEY".to_string()
        )]
    );
}

#[tokio::test]
async fn twitter_always_ingests_without_novelty_check() {
    let h = harness(FakeNovelty::default(), CountingSocial::default());

    for _ in 0..2 {
        let out = h
            .dispatcher
            .dispatch(FlashSource::Twitter, "KEY")
            .await
            .unwrap();
        assert_eq!(out, DispatchOutcome::Processed { stored: 1 });
    }

    assert_eq!(*h.social.calls.lock(), 2);
    assert!(h.novelty.calls.lock().is_empty());
    assert!(h.parser.calls.lock().is_empty());
}

#[tokio::test]
async fn run_dispatches_sources_in_fixed_order() {
    let mut novelty = FakeNovelty::default();
    novelty.answers.insert("ynet", Ok(true));
    novelty.answers.insert("walla", Ok(true));
    let h = harness(novelty, CountingSocial::default());

    let report = run(&h.dispatcher, "KEY").await;

    let order: Vec<_> = report.results.iter().map(|(s, _)| *s).collect();
    assert_eq!(order, FlashSource::ALL);
    assert!(report.is_clean());
    let parsed: Vec<_> = h.parser.calls.lock().iter().map(|c| c.1.clone()).collect();
    assert_eq!(parsed, ["ynet", "walla"]);
    assert_eq!(*h.social.calls.lock(), 1);
}

#[tokio::test]
async fn failing_source_does_not_stop_the_others() {
    let mut novelty = FakeNovelty::default();
    novelty.answers.insert("ynet", Err("dns failure"));
    novelty.answers.insert("walla", Ok(true));
    let h = harness(
        novelty,
        CountingSocial {
            fail: true,
            ..Default::default()
        },
    );

    let report = run(&h.dispatcher, "KEY").await;

    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed, [FlashSource::Ynet, FlashSource::Twitter]);
    assert!(matches!(
        report.results[1].1,
        Ok(DispatchOutcome::Processed { stored: 2 })
    ));
    assert!(matches!(report.results[0].1, Err(IngestError::Fetch { .. })));
    assert_eq!(*h.social.calls.lock(), 1);
}

#[tokio::test]
async fn selected_sources_keep_the_fixed_order() {
    let mut novelty = FakeNovelty::default();
    novelty.answers.insert("ynet", Ok(true));
    let h = harness(novelty, CountingSocial::default());
    let selected: Vec<FlashSource> = ["twitter", "ynet"]
        .iter()
        .map(|id| id.parse().unwrap())
        .collect();

    let report = run_selected(&h.dispatcher, &selected, "KEY").await;

    let order: Vec<_> = report.results.iter().map(|(s, _)| *s).collect();
    assert_eq!(order, [FlashSource::Ynet, FlashSource::Twitter]);
    assert!(h.novelty.calls.lock().iter().all(|(_, id)| id != "walla"));
    assert_eq!(*h.social.calls.lock(), 1);
}
