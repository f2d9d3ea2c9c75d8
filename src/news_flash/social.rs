// src/news_flash/social.rs
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::feed::{normalize_text, parse_rfc3339_to_unix};
use super::novelty::{Marker, MarkerStore};
use super::sink::{is_accident_related, FlashSink, NewsFlash};
use super::source::FlashSource;
use crate::error::{IngestError, Result};

pub const TWITTER_API_BASE: &str = "https://api.twitter.com";

const PAGE_SIZE: &str = "100";
/// Upper bound on timeline pages followed in one catch-up run.
pub const MAX_TIMELINE_PAGES: usize = 10;

/// Entry point of the social-media source. Manages its own freshness.
#[async_trait]
pub trait SocialIngest: Send + Sync {
    async fn ingest(&self) -> Result<usize>;
}

#[derive(Debug, Deserialize)]
struct UserLookup {
    data: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub data: Vec<Tweet>,
    #[serde(default)]
    pub meta: TimelineMeta,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimelineMeta {
    pub newest_id: Option<String>,
    pub next_token: Option<String>,
    #[serde(default)]
    pub result_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub created_at: Option<String>,
}

/// Accident-related tweets as flashes, plus the cursor to store next.
pub fn timeline_to_flashes(account: &str, timeline: Timeline) -> (Vec<NewsFlash>, Option<String>) {
    let newest = timeline
        .meta
        .newest_id
        .or_else(|| timeline.data.first().map(|t| t.id.clone()));

    let flashes = timeline
        .data
        .into_iter()
        .filter_map(|t| {
            let text = normalize_text(&t.text);
            if !is_accident_related(&text) {
                return None;
            }
            Some(NewsFlash {
                source: FlashSource::Twitter.id().to_string(),
                link: Some(format!("https://twitter.com/{account}/status/{}", t.id)),
                published_at: t
                    .created_at
                    .as_deref()
                    .map(parse_rfc3339_to_unix)
                    .unwrap_or(0),
                title: text,
                description: String::new(),
                accident: true,
            })
        })
        .collect();

    (flashes, newest)
}

/// Twitter API v2 user timeline, cursor kept under the `twitter` marker.
pub struct TwitterIngest {
    client: reqwest::Client,
    api_base: String,
    bearer_token: Option<String>,
    account: String,
    markers: MarkerStore,
    sink: Arc<dyn FlashSink>,
}

impl TwitterIngest {
    pub fn new(
        account: impl Into<String>,
        bearer_token: Option<String>,
        markers: MarkerStore,
        sink: Arc<dyn FlashSink>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::fetch(TWITTER_API_BASE, e))?;
        Ok(Self {
            client,
            api_base: TWITTER_API_BASE.to_string(),
            bearer_token,
            account: account.into(),
            markers,
            sink,
        })
    }

    /// Point at a different API host (proxy, mock server).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| IngestError::fetch(url, e))?;
        resp.json::<T>()
            .await
            .map_err(|e| IngestError::parse(FlashSource::Twitter.id(), e))
    }
}

#[async_trait]
impl SocialIngest for TwitterIngest {
    #[tracing::instrument(level = "info", skip(self), fields(account = %self.account))]
    async fn ingest(&self) -> Result<usize> {
        let Some(token) = self.bearer_token.as_deref() else {
            tracing::debug!("Twitter disabled (no TWITTER_BEARER_TOKEN)");
            return Ok(0);
        };
        let source_id = FlashSource::Twitter.id();

        let lookup_url = format!("{}/2/users/by/username/{}", self.api_base, self.account);
        let user: UserLookup = self.get_json(token, &lookup_url, &[]).await?;
        let Some(user) = user.data else {
            return Err(IngestError::parse(
                source_id,
                format!("account `{}` not found", self.account),
            ));
        };

        let since = self.markers.get(source_id).await?.map(|m| m.fingerprint);
        let timeline_url = format!("{}/2/users/{}/tweets", self.api_base, user.id);

        // Without a stored cursor only the latest page is taken; with one,
        // pages are followed back to it.
        let mut flashes = Vec::new();
        let mut newest = None;
        let mut fetched = 0;
        let mut page_token: Option<String> = None;
        for page in 0..MAX_TIMELINE_PAGES {
            let timeline: Timeline = {
                let mut query = vec![("max_results", PAGE_SIZE), ("tweet.fields", "created_at")];
                if let Some(since_id) = since.as_deref() {
                    query.push(("since_id", since_id));
                }
                if let Some(cursor) = page_token.as_deref() {
                    query.push(("pagination_token", cursor));
                }
                self.get_json(token, &timeline_url, &query).await?
            };
            fetched += timeline.data.len();
            let next = timeline.meta.next_token.clone();

            let (page_flashes, page_newest) = timeline_to_flashes(&self.account, timeline);
            if page == 0 {
                newest = page_newest;
            }
            flashes.extend(page_flashes);

            page_token = match next {
                Some(t) if since.is_some() => Some(t),
                _ => None,
            };
            if page_token.is_none() {
                break;
            }
        }
        if page_token.is_some() {
            tracing::warn!(
                pages = MAX_TIMELINE_PAGES,
                "timeline catch-up hit the page cap; older tweets are skipped"
            );
        }

        let kept = flashes.len();
        self.sink.store(flashes).await?;
        counter!("news_flash_stored_total").increment(kept as u64);

        if let Some(newest) = newest {
            self.markers
                .set(
                    source_id,
                    Marker {
                        fingerprint: newest,
                        title: String::new(),
                        seen_at: Utc::now(),
                    },
                )
                .await?;
        }

        tracing::info!(fetched, kept, "ingested tweets");
        Ok(kept)
    }
}
