use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub worklist: WorklistConfig,
    #[serde(default)]
    pub filter: PageFilterConfig,
    #[serde(default)]
    pub wayback: WaybackConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// How consecutive identical captures are skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipUnchanged {
    /// Import every capture
    None,
    /// Ask the archive index to collapse identical raw responses
    Response,
    /// Compare hashes of the fetched (post-redirect) content
    #[default]
    ResolvedResponse,
}

impl SkipUnchanged {
    /// Whether the archive index should collapse repeated captures
    pub fn collapse_in_index(self) -> bool {
        self == SkipUnchanged::Response
    }

    /// Whether fetched versions pass through the change filter
    pub fn filter_fetched(self) -> bool {
        self == SkipUnchanged::ResolvedResponse
    }
}

impl std::str::FromStr for SkipUnchanged {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SkipUnchanged::None),
            "response" => Ok(SkipUnchanged::Response),
            "resolved-response" => Ok(SkipUnchanged::ResolvedResponse),
            other => Err(format!(
                "must be one of `none`, `response`, or `resolved-response` (got `{}`)",
                other
            )),
        }
    }
}

/// Import run settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportConfig {
    /// Workers per retry tier
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    /// Where the unplaybackable skip-cache lives; no path disables persistence
    #[serde(default)]
    pub unplaybackable_path: Option<PathBuf>,
    #[serde(default = "default_unplaybackable_ttl")]
    pub unplaybackable_ttl: HumanDuration,
    #[serde(default)]
    pub skip_unchanged: SkipUnchanged,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            unplaybackable_path: None,
            unplaybackable_ttl: default_unplaybackable_ttl(),
            skip_unchanged: SkipUnchanged::default(),
        }
    }
}

fn default_parallel() -> usize {
    10
}

fn default_unplaybackable_ttl() -> HumanDuration {
    HumanDuration::from_days(7)
}

/// Worklist construction settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorklistConfig {
    /// Query a whole domain once more than this many of its URLs are tracked
    #[serde(default = "default_max_urls_per_domain")]
    pub max_urls_per_domain: usize,
    /// Domains that are always queried URL-by-URL (subdomains included)
    #[serde(default = "default_never_query_domains")]
    pub never_query_domains: Vec<String>,
    #[serde(default = "default_page_chunk_size")]
    pub page_chunk_size: usize,
}

impl Default for WorklistConfig {
    fn default() -> Self {
        Self {
            max_urls_per_domain: default_max_urls_per_domain(),
            never_query_domains: default_never_query_domains(),
            page_chunk_size: default_page_chunk_size(),
        }
    }
}

fn default_max_urls_per_domain() -> usize {
    30
}

fn default_never_query_domains() -> Vec<String> {
    ["instagram.com", "youtube.com", "amazon.com"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_page_chunk_size() -> usize {
    1000
}

/// Data for the "looks like a page" heuristic
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageFilterConfig {
    #[serde(default = "default_subresource_mime_types")]
    pub subresource_mime_types: Vec<String>,
    #[serde(default = "default_subresource_extensions")]
    pub subresource_extensions: Vec<String>,
}

impl Default for PageFilterConfig {
    fn default() -> Self {
        Self {
            subresource_mime_types: default_subresource_mime_types(),
            subresource_extensions: default_subresource_extensions(),
        }
    }
}

fn default_subresource_mime_types() -> Vec<String> {
    [
        "text/css",
        "text/javascript",
        "application/javascript",
        "image/jpeg",
        "image/webp",
        "image/png",
        "image/gif",
        "image/bmp",
        "image/tiff",
        "image/x-icon",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_subresource_extensions() -> Vec<String> {
    [
        ".css", ".js", ".es", ".es6", ".jsm", ".jpg", ".jpeg", ".webp", ".png", ".gif", ".bmp",
        ".tif", ".ico",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Wayback Machine endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WaybackConfig {
    #[serde(default = "default_cdx_url")]
    pub cdx_url: String,
    /// Base for memento URLs (`{web_url}/{timestamp}id_/{url}`)
    #[serde(default = "default_web_url")]
    pub web_url: String,
    /// CDX rows requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Network policy for index queries
    #[serde(default = "default_index_retry")]
    pub index_retry: RetryPolicy,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WaybackConfig {
    fn default() -> Self {
        Self {
            cdx_url: default_cdx_url(),
            web_url: default_web_url(),
            page_size: default_page_size(),
            index_retry: default_index_retry(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_cdx_url() -> String {
    "https://web.archive.org/cdx/search/cdx".to_string()
}

fn default_web_url() -> String {
    "https://web.archive.org/web".to_string()
}

fn default_page_size() -> usize {
    5000
}

fn default_index_retry() -> RetryPolicy {
    RetryPolicy::new(10, 4.0, Duration::from_secs_f64(60.5))
}

fn default_user_agent() -> String {
    concat!("wm-import/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Network policy for one escalation level
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub timeout: HumanDuration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_factor: f64, timeout: Duration) -> Self {
        Self {
            max_retries,
            backoff_factor,
            timeout: HumanDuration(timeout),
        }
    }

    /// Sleep before retry number `retry` (1-based), capped at two minutes
    pub fn backoff(&self, retry: u32) -> Duration {
        const MAX_BACKOFF_SECS: f64 = 120.0;

        if retry == 0 || self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let secs = self.backoff_factor * 2f64.powi(retry as i32 - 1);
        Duration::from_secs_f64(secs.min(MAX_BACKOFF_SECS))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(3, 2.0, Duration::from_secs_f64(30.5))
    }
}

/// Ordered retry tiers, evaluated first to last
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_tiers")]
    pub tiers: Vec<RetryPolicy>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }
}

fn default_tiers() -> Vec<RetryPolicy> {
    vec![
        RetryPolicy::default(),
        RetryPolicy::new(3, 4.0, Duration::from_secs_f64(30.5)),
        RetryPolicy::new(7, 4.0, Duration::from_secs_f64(60.5)),
    ]
}

/// web-monitoring-db connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Account email (loaded from environment, not from config file)
    #[serde(skip)]
    pub email: Option<String>,
    /// Account password (loaded from environment, not from config file)
    #[serde(skip)]
    pub password: Option<String>,
    #[serde(default = "default_import_batch_size")]
    pub import_batch_size: usize,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: HumanDuration,
    #[serde(default = "default_db_timeout")]
    pub timeout: HumanDuration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            email: None,
            password: None,
            import_batch_size: default_import_batch_size(),
            poll_interval: default_poll_interval(),
            timeout: default_db_timeout(),
        }
    }
}

fn default_db_url() -> String {
    "https://api.monitoring.envirodatagov.org".to_string()
}

fn default_import_batch_size() -> usize {
    1000
}

fn default_poll_interval() -> HumanDuration {
    HumanDuration(Duration::from_secs(1))
}

fn default_db_timeout() -> HumanDuration {
    HumanDuration(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.import.parallel, 10);
        assert_eq!(config.import.unplaybackable_ttl, HumanDuration::from_days(7));
        assert_eq!(config.import.skip_unchanged, SkipUnchanged::ResolvedResponse);
        assert_eq!(config.worklist.max_urls_per_domain, 30);
        assert_eq!(config.worklist.never_query_domains.len(), 3);
        assert_eq!(config.retry.tiers.len(), 3);
        assert_eq!(config.retry.tiers[2].max_retries, 7);
        assert_eq!(config.database.import_batch_size, 1000);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::new(10, 4.0, Duration::from_secs(1));
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
        assert_eq!(policy.backoff(3), Duration::from_secs(16));
        assert_eq!(policy.backoff(9), Duration::from_secs(120));

        let no_backoff = RetryPolicy::new(3, 0.0, Duration::from_secs(1));
        assert_eq!(no_backoff.backoff(3), Duration::ZERO);
    }

    #[test]
    fn test_skip_unchanged_parsing() {
        assert_eq!("none".parse::<SkipUnchanged>().unwrap(), SkipUnchanged::None);
        assert_eq!("response".parse::<SkipUnchanged>().unwrap(), SkipUnchanged::Response);
        assert_eq!(
            "resolved-response".parse::<SkipUnchanged>().unwrap(),
            SkipUnchanged::ResolvedResponse
        );
        assert!("sometimes".parse::<SkipUnchanged>().is_err());

        assert!(SkipUnchanged::Response.collapse_in_index());
        assert!(!SkipUnchanged::ResolvedResponse.collapse_in_index());
        assert!(SkipUnchanged::ResolvedResponse.filter_fetched());
    }
}
