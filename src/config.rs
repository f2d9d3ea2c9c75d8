// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/ingest.toml";

pub const DEFAULT_BUCKET: &str = "anyway-cbs-data";
pub const DEFAULT_REGION: &str = "eu-west-1";
pub const DEFAULT_STATE_PATH: &str = "state/news_flash_markers.json";
pub const DEFAULT_OUTPUT_PATH: &str = "output/news_flash.jsonl";
pub const DEFAULT_TWITTER_ACCOUNT: &str = "mda_israel";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}
fn default_region() -> String {
    DEFAULT_REGION.to_string()
}
fn default_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_PATH)
}
fn default_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}
fn default_twitter_account() -> String {
    DEFAULT_TWITTER_ACCOUNT.to_string()
}
fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cbs: CbsConfig,
    pub news_flash: NewsFlashConfig,
}

/// Object store access for the CBS mirror.
#[derive(Clone, Deserialize)]
pub struct CbsConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint (minio, localstack); `None` means AWS.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Parent of the per-run working directory. Defaults to the OS temp dir.
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
}

impl Default for CbsConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            temp_root: None,
        }
    }
}

impl CbsConfig {
    /// Static credentials only when both halves are present.
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (self.access_key.as_deref(), self.secret_key.as_deref()) {
            (Some(a), Some(s)) => Some((a, s)),
            _ => None,
        }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl fmt::Debug for CbsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CbsConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_len", &self.access_key.as_ref().map(String::len))
            .field("secret_key_len", &self.secret_key.as_ref().map(String::len))
            .field("temp_root", &self.temp_root)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct NewsFlashConfig {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    #[serde(default = "default_twitter_account")]
    pub twitter_account: String,
    #[serde(default)]
    pub twitter_bearer_token: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for NewsFlashConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            output_path: default_output_path(),
            twitter_account: default_twitter_account(),
            twitter_bearer_token: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl fmt::Debug for NewsFlashConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewsFlashConfig")
            .field("state_path", &self.state_path)
            .field("output_path", &self.output_path)
            .field("twitter_account", &self.twitter_account)
            .field(
                "twitter_token_len",
                &self.twitter_bearer_token.as_ref().map(String::len),
            )
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("cbs", &self.cbs)
            .field("news_flash", &self.news_flash)
            .finish()
    }
}

/// Load config from an explicit TOML file.
pub fn load_from(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading ingest config from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Resolve config the way the binary does:
/// 1) $INGEST_CONFIG_PATH (must exist when set)
/// 2) config/ingest.toml
/// 3) built-in defaults
///
/// then environment overrides on top.
pub fn load_default() -> Result<AppConfig> {
    let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        load_from(&pb)?
    } else {
        let p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if p.exists() {
            load_from(&p)?
        } else {
            AppConfig::default()
        }
    };
    apply_env_overrides(&mut cfg, |k| std::env::var(k).ok())?;
    Ok(cfg)
}

/// Blank values count as unset.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |k: &str| {
        lookup(k)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = get("AWS_ACCESS_KEY") {
        cfg.cbs.access_key = Some(v);
    }
    if let Some(v) = get("AWS_SECRET_KEY") {
        cfg.cbs.secret_key = Some(v);
    }
    if let Some(v) = get("AWS_REGION") {
        cfg.cbs.region = v;
    }
    if let Some(v) = get("CBS_BUCKET") {
        cfg.cbs.bucket = v;
    }
    if let Some(v) = get("S3_ENDPOINT") {
        cfg.cbs.endpoint = Some(v);
    }
    if let Some(v) = get("CBS_TEMP_ROOT") {
        cfg.cbs.temp_root = Some(PathBuf::from(v));
    }
    if let Some(v) = get("NEWS_FLASH_STATE_PATH") {
        cfg.news_flash.state_path = PathBuf::from(v);
    }
    if let Some(v) = get("NEWS_FLASH_OUTPUT_PATH") {
        cfg.news_flash.output_path = PathBuf::from(v);
    }
    if let Some(v) = get("TWITTER_BEARER_TOKEN") {
        cfg.news_flash.twitter_bearer_token = Some(v);
    }
    if let Some(v) = get("TWITTER_ACCOUNT") {
        cfg.news_flash.twitter_account = v;
    }
    if let Some(v) = get("HTTP_TIMEOUT_SECS") {
        cfg.news_flash.http_timeout_secs = v
            .parse()
            .with_context(|| format!("HTTP_TIMEOUT_SECS is not a number: {v}"))?;
    }
    Ok(())
}
