// src/news_flash/feed.rs
use async_trait::async_trait;
use metrics::histogram;
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime, UtcOffset,
};

use crate::error::{IngestError, Result};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// One entry of a feed, newest first as published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// guid, else link, else title
    pub id: String,
    pub title: String,
    pub link: Option<String>,
    pub description: String,
    /// unix seconds, 0 when unknown
    pub published_at: u64,
}

#[async_trait]
pub trait FeedReader: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>>;
}

pub struct HttpFeedReader {
    client: reqwest::Client,
}

impl HttpFeedReader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::fetch("<client>", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedReader for HttpFeedReader {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| IngestError::fetch(url, e))?;
        let body = resp.text().await.map_err(|e| IngestError::fetch(url, e))?;
        parse_feed(&body, url)
    }
}

/// Parse a feed body: RSS when it looks like XML, otherwise the walla
/// breaking-news HTML page.
pub fn parse_feed(body: &str, page_url: &str) -> Result<Vec<FeedItem>> {
    let t0 = std::time::Instant::now();
    let head = body.trim_start();
    let items = if head.starts_with("<?xml") || head.contains("<rss") {
        parse_rss(body).map_err(|e| IngestError::fetch(page_url, format!("rss: {e}")))?
    } else {
        let items = parse_breaking_html(body, page_url);
        // captcha, error page or a changed layout
        if items.is_empty() {
            return Err(IngestError::fetch(page_url, "no breaking items recognised"));
        }
        items
    };
    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("news_flash_feed_parse_ms").record(ms);
    Ok(items)
}

// ---- RSS ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: String,
}

fn parse_rfc2822_to_unix(ts: &str) -> u64 {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
        .unwrap_or(0)
}

pub(crate) fn parse_rfc3339_to_unix(ts: &str) -> u64 {
    OffsetDateTime::parse(ts.trim(), &Rfc3339)
        .ok()
        .map(|dt| dt.unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
        .unwrap_or(0)
}

fn first_non_empty(candidates: [Option<&str>; 3]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn parse_rss(xml: &str) -> anyhow::Result<Vec<FeedItem>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean)?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = normalize_text(it.title.as_deref().unwrap_or_default());
        let link = it
            .link
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        let Some(id) = first_non_empty([
            it.guid.as_ref().map(|g| g.value.as_str()),
            link.as_deref(),
            Some(title.as_str()),
        ]) else {
            continue;
        };

        out.push(FeedItem {
            id,
            title,
            link,
            description: normalize_text(it.description.as_deref().unwrap_or_default()),
            published_at: it
                .pub_date
                .as_deref()
                .map(parse_rfc2822_to_unix)
                .unwrap_or(0),
        });
    }
    Ok(out)
}

/// Rewrite HTML named entities into text quick-xml accepts. XML's own five are
/// left alone; unknown names are escaped so they survive as literal text.
fn scrub_html_entities_for_xml(s: &str) -> Cow<'_, str> {
    static RE_ENTITY: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]*);").expect("valid entity regex"));

    RE_ENTITY.replace_all(s, |caps: &Captures<'_>| {
        let whole = &caps[0];
        match &caps[1] {
            "amp" | "lt" | "gt" | "quot" | "apos" => whole.to_string(),
            _ => {
                let decoded = html_escape::decode_html_entities(whole);
                if decoded == whole {
                    format!("&amp;{}", &whole[1..])
                } else {
                    html_escape::encode_text(&decoded).into_owned()
                }
            }
        }
    })
}

// ---- walla breaking page ----

static SEL_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article").expect("valid item selector"));
static SEL_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, .title").expect("valid title selector"));
static SEL_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));
static SEL_TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time").expect("valid time selector"));
static SEL_DESC: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("valid description selector"));

fn element_text(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Every `<article>` with a heading is one breaking item.
pub fn parse_breaking_html(html: &str, page_url: &str) -> Vec<FeedItem> {
    let document = Html::parse_document(html);
    let base = url::Url::parse(page_url).ok();

    let mut out = Vec::new();
    for article in document.select(&SEL_ITEM) {
        let Some(title) = article
            .select(&SEL_TITLE)
            .map(element_text)
            .find(|t| !t.is_empty())
        else {
            continue;
        };

        let link = article
            .select(&SEL_LINK)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| match &base {
                Some(b) => b
                    .join(href)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| href.to_string()),
                None => href.to_string(),
            })
            .next();

        let published_at = article
            .select(&SEL_TIME)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .map(parse_rfc3339_to_unix)
            .unwrap_or(0);

        let description = article
            .select(&SEL_DESC)
            .map(element_text)
            .find(|t| !t.is_empty())
            .unwrap_or_default();

        let id = link.clone().unwrap_or_else(|| title.clone());
        out.push(FeedItem {
            id,
            title,
            link,
            description,
            published_at,
        });
    }
    out
}

/// Normalize text: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // “ ” « » → " and ‘ ’ → '
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_tags_and_entities() {
        let s = "  <p>Crash on&nbsp;&nbsp;Route 6</p><br/>“quoted”  ";
        assert_eq!(normalize_text(s), "Crash on Route 6 \"quoted\"");
    }

    #[test]
    fn rss_item_id_falls_back_to_link_then_title() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
  <item><title>A</title><link>https://x/a</link><guid isPermaLink="false">g-1</guid></item>
  <item><title>B</title><link>https://x/b</link></item>
  <item><title>C</title></item>
  <item><description>no title, no link</description></item>
</channel></rss>"#;
        let items = parse_rss(xml).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["g-1", "https://x/b", "C"]);
    }

    #[test]
    fn rfc2822_dates_become_unix() {
        assert_eq!(parse_rfc2822_to_unix("Thu, 01 Jan 1970 00:01:00 +0000"), 60);
        assert_eq!(parse_rfc2822_to_unix("yesterday"), 0);
    }

    #[test]
    fn html_body_is_not_treated_as_rss() {
        let html = r#"<html><body>
            <article><h3>Motorcyclist hurt</h3><a href="/break/1">x</a>
            <time datetime="2024-05-01T10:00:00+03:00">10:00</time></article>
            <article><span>no heading</span></article>
        </body></html>"#;
        let items = parse_feed(html, "https://news.walla.co.il/breaking").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Motorcyclist hurt");
        assert_eq!(items[0].link.as_deref(), Some("https://news.walla.co.il/break/1"));
        assert_eq!(items[0].id, "https://news.walla.co.il/break/1");
        assert_eq!(items[0].published_at, 1_714_546_800);
    }

    #[test]
    fn html_entities_outside_xml_set_do_not_break_the_channel() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
  <item><title>Crash&hellip; on route 6 &laquo;live&raquo;</title><guid>a</guid></item>
  <item><title>Tom &amp; Jerry &madeup; &bull;</title><guid>b</guid></item>
</channel></rss>"#;
        let items = parse_rss(xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Crash\u{2026} on route 6 \"live\"");
        assert_eq!(items[1].title, "Tom & Jerry &madeup; \u{2022}");
    }

    #[test]
    fn html_page_without_items_is_a_fetch_error() {
        let html = "<html><body><div class='captcha'>Access denied</div></body></html>";
        let err = parse_feed(html, "https://news.walla.co.il/breaking").unwrap_err();
        assert!(matches!(err, IngestError::Fetch { ref reason, .. } if reason.contains("no breaking items")));
    }

    #[test]
    fn rss_channel_without_items_is_empty_not_an_error() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title></channel></rss>"#;
        assert!(parse_feed(xml, "https://x/rss").unwrap().is_empty());
    }

    #[test]
    fn broken_xml_is_a_fetch_error() {
        let err = parse_feed("<?xml version=\"1.0\"?><rss><channel>", "https://x/rss").unwrap_err();
        assert_eq!(err.kind(), "fetch");
    }
}
