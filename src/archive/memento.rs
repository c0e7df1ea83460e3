//! Turning an archived capture into an importable version

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

use super::error::{FetchError, FetchResult};
use super::session::{WaybackSession, is_memento};
use super::types::{CaptureRecord, ImportVersion, SourceMetadata, VersionAnnotations};
use super::{MementoSession, SessionFactory};
use crate::config::RetryPolicy;

pub const SOURCE_TYPE: &str = "internet_archive";

const ARCHIVED_HEADER_PREFIX: &str = "x-archive-orig-";

static TITLE_EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").expect("title pattern"));

static MEMENTO_URL_EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/web/\d{1,14}(?:[a-z]{2}_)?/(.+)$").expect("memento url pattern"));

#[async_trait]
impl MementoSession for WaybackSession {
    async fn fetch_version(
        &self,
        record: &CaptureRecord,
        annotations: &VersionAnnotations,
    ) -> FetchResult<ImportVersion> {
        let response = self.get(&record.raw_url, &[]).await?;
        let status = response.status();

        if !is_memento(&response) {
            return Err(classify_non_memento(status, &record.raw_url));
        }

        let final_url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&record.raw_url, &e))?;

        debug!(url = %record.raw_url, size = body.len(), "Memento loaded");

        Ok(build_version(
            record,
            annotations,
            status,
            &headers,
            &final_url,
            &body,
        ))
    }
}

/// Opens a fresh [`WaybackSession`] per worker and tier
#[derive(Debug, Clone)]
pub struct WaybackSessionFactory {
    user_agent: String,
}

impl WaybackSessionFactory {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

impl SessionFactory for WaybackSessionFactory {
    fn open(&self, policy: &RetryPolicy) -> FetchResult<Box<dyn MementoSession>> {
        Ok(Box::new(WaybackSession::new(policy.clone(), &self.user_agent)?))
    }
}

/// Classify a response that did not carry an archived capture
fn classify_non_memento(status: StatusCode, url: &str) -> FetchError {
    if status == StatusCode::NOT_FOUND {
        FetchError::NotFound {
            url: url.to_string(),
        }
    } else if status.is_client_error() || status.is_server_error() {
        FetchError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        }
    } else {
        FetchError::Playback {
            url: url.to_string(),
            reason: format!("HTTP {} response is not a memento", status.as_u16()),
        }
    }
}

/// Assemble the import entry for a loaded memento
pub fn build_version(
    record: &CaptureRecord,
    annotations: &VersionAnnotations,
    status: StatusCode,
    headers: &HeaderMap,
    final_url: &str,
    body: &[u8],
) -> ImportVersion {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<mime::Mime>().ok());

    let mime_type = content_type
        .as_ref()
        .map(|m| m.essence_str().to_string())
        .or_else(|| record.mime_type.clone());
    let encoding = content_type
        .as_ref()
        .and_then(|m| m.get_param(mime::CHARSET))
        .map(|charset| charset.as_str().to_lowercase());

    let title = match mime_type.as_deref() {
        Some("text/html") | Some("application/xhtml+xml") => extract_title(body),
        _ => String::new(),
    };

    let archived_headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str().strip_prefix(ARCHIVED_HEADER_PREFIX)?;
            Some((name.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();

    let redirected_url = (final_url != record.raw_url)
        .then(|| original_url(final_url))
        .filter(|url| url != &record.url);

    ImportVersion {
        page_url: record.url.clone(),
        page_maintainers: annotations.maintainers.clone(),
        page_tags: annotations.tags.clone(),
        title,
        capture_time: record.timestamp,
        uri: record.raw_url.clone(),
        version_hash: hash_content(body),
        source_type: SOURCE_TYPE.to_string(),
        source_metadata: SourceMetadata {
            status_code: status.as_u16(),
            mime_type,
            encoding,
            headers: archived_headers,
            view_url: record.view_url.clone(),
            redirected_url,
        },
    }
}

/// SHA-256 of the archived body, hex encoded
pub fn hash_content(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

fn extract_title(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    TITLE_EXPRESSION
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

/// Strip the archive prefix from a memento URL
fn original_url(memento_url: &str) -> String {
    MEMENTO_URL_EXPRESSION
        .captures(memento_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| memento_url.to_string())
}
