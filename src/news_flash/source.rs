// src/news_flash/source.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const YNET_RSS_URL: &str = "https://www.ynet.co.il/Integration/StoryRss1854.xml";
pub const WALLA_BREAKING_URL: &str = "https://news.walla.co.il/breaking";

/// The fixed set of news-flash sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashSource {
    Ynet,
    Walla,
    Twitter,
}

impl FlashSource {
    /// Dispatch order of a full run.
    pub const ALL: [FlashSource; 3] = [FlashSource::Ynet, FlashSource::Walla, FlashSource::Twitter];

    pub fn id(self) -> &'static str {
        match self {
            FlashSource::Ynet => "ynet",
            FlashSource::Walla => "walla",
            FlashSource::Twitter => "twitter",
        }
    }

    /// Feed URL for the novelty-gated sources; `None` for the social account.
    pub fn feed_url(self) -> Option<&'static str> {
        match self {
            FlashSource::Ynet => Some(YNET_RSS_URL),
            FlashSource::Walla => Some(WALLA_BREAKING_URL),
            FlashSource::Twitter => None,
        }
    }
}

impl fmt::Display for FlashSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSource(pub String);

impl fmt::Display for UnknownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown news-flash source `{}`", self.0)
    }
}

impl std::error::Error for UnknownSource {}

impl FromStr for FlashSource {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ynet" => Ok(FlashSource::Ynet),
            "walla" => Ok(FlashSource::Walla),
            "twitter" => Ok(FlashSource::Twitter),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}
