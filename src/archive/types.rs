use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamp layout used by the Wayback index and memento URLs
pub const WAYBACK_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// One archived snapshot known to the index, not yet fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// SURT-form index key
    pub key: String,
    pub timestamp: DateTime<Utc>,
    /// URL as originally captured
    pub url: String,
    pub mime_type: Option<String>,
    pub status_code: Option<u16>,
    pub digest: Option<String>,
    pub length: Option<u64>,
    /// Memento URL serving the unmodified archived bytes
    pub raw_url: String,
    /// Memento URL for humans (rewritten playback)
    pub view_url: String,
}

impl CaptureRecord {
    /// Wayback-style `YYYYMMDDhhmmss` timestamp
    pub fn wayback_timestamp(&self) -> String {
        format_wayback_timestamp(&self.timestamp)
    }
}

pub fn format_wayback_timestamp(time: &DateTime<Utc>) -> String {
    time.format(WAYBACK_TIMESTAMP_FORMAT).to_string()
}

/// Parse a (possibly truncated) Wayback timestamp; missing trailing fields are zero
pub fn parse_wayback_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if value.len() < 4 || value.len() > 14 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut padded = value.to_string();
    // Month and day cannot be zero
    while padded.len() < 14 {
        let next = if padded.len() == 4 || padded.len() == 6 { "01" } else { "00" };
        padded.push_str(next);
    }
    NaiveDateTime::parse_from_str(&padded, WAYBACK_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Page annotations attached to every imported version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionAnnotations {
    pub maintainers: Vec<String>,
    pub tags: Vec<String>,
}

/// Import-ready representation of a fetched capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportVersion {
    pub page_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_maintainers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_tags: Vec<String>,
    #[serde(default)]
    pub title: String,
    pub capture_time: DateTime<Utc>,
    pub uri: String,
    pub version_hash: String,
    pub source_type: String,
    pub source_metadata: SourceMetadata,
}

/// Archive-specific details carried alongside a version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub view_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirected_url: Option<String>,
}

/// Parameters for one archive index listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdxQuery {
    /// URL or wildcard pattern (`http://example.com/*`)
    pub url: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Collapse adjacent captures with identical content digests
    pub skip_repeats: bool,
}

/// One page of index results
#[derive(Debug, Clone, Default)]
pub struct CdxPage {
    pub records: Vec<CaptureRecord>,
    /// Present when the index has more rows for the same query
    pub resume_key: Option<String>,
}
