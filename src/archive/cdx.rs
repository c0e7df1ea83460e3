//! Wayback CDX index listing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::ArchiveIndex;
use super::error::{FetchError, ListError};
use super::session::WaybackSession;
use super::types::{CaptureRecord, CdxPage, CdxQuery, format_wayback_timestamp, parse_wayback_timestamp};
use crate::config::WaybackConfig;

/// Markers in an index response body meaning the target is excluded from access
const BLOCKED_MARKERS: &[&str] = &[
    "Blocked Site Error",
    "Blocked By Robots",
    "AdministrativeAccessControlException",
    "RobotAccessControlException",
];

/// Archive index client for the Wayback Machine
#[derive(Debug, Clone)]
pub struct WaybackClient {
    session: WaybackSession,
    cdx_url: String,
    web_url: String,
    page_size: usize,
}

impl WaybackClient {
    pub fn new(config: &WaybackConfig) -> Result<Self, FetchError> {
        Ok(Self {
            session: WaybackSession::new(config.index_retry.clone(), &config.user_agent)?,
            cdx_url: config.cdx_url.clone(),
            web_url: config.web_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
        })
    }

    fn query_params(&self, query: &CdxQuery, resume_key: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("url", query.url.clone()),
            ("limit", self.page_size.to_string()),
            ("showResumeKey", "true".to_string()),
        ];
        if let Some(from) = &query.from {
            params.push(("from", format_wayback_timestamp(from)));
        }
        if let Some(to) = &query.to {
            params.push(("to", format_wayback_timestamp(to)));
        }
        if query.skip_repeats {
            params.push(("collapse", "digest".to_string()));
        }
        if let Some(key) = resume_key {
            params.push(("resumeKey", key.to_string()));
        }
        params
    }
}

#[async_trait]
impl ArchiveIndex for WaybackClient {
    async fn list_page(
        &self,
        query: &CdxQuery,
        resume_key: Option<&str>,
    ) -> Result<CdxPage, ListError> {
        let index_error = |message: String| ListError::Index {
            url: query.url.clone(),
            message,
        };

        let params = self.query_params(query, resume_key);
        let response = self
            .session
            .get(&self.cdx_url, &params)
            .await
            .map_err(|e| index_error(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| index_error(e.to_string()))?;

        if let Some(marker) = BLOCKED_MARKERS.iter().find(|m| body.contains(*m)) {
            return Err(ListError::BlockedByPolicy {
                url: query.url.clone(),
                message: marker.to_string(),
            });
        }
        if !status.is_success() {
            return Err(index_error(format!("HTTP {}", status.as_u16())));
        }

        let page = parse_cdx(&body, &self.web_url).map_err(index_error)?;
        debug!(
            url = %query.url,
            rows = page.records.len(),
            more = page.resume_key.is_some(),
            "Listed index page"
        );

        if page.records.is_empty() && resume_key.is_none() && page.resume_key.is_none() {
            return Err(ListError::NoArchivedVersions {
                url: query.url.clone(),
            });
        }
        Ok(page)
    }
}

/// Parse a plain-text CDX body
///
/// Rows are `urlkey timestamp original mimetype statuscode digest length`,
/// with `-` for absent values. A blank line followed by a final line carries
/// the resume key for the next page.
pub fn parse_cdx(body: &str, web_url: &str) -> Result<CdxPage, String> {
    let mut page = CdxPage::default();
    let mut lines = body.lines();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            page.resume_key = lines
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string);
            break;
        }
        page.records.push(parse_row(line, web_url)?);
    }

    Ok(page)
}

fn parse_row(line: &str, web_url: &str) -> Result<CaptureRecord, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [key, timestamp, url, mime_type, status_code, digest, length] = fields[..] else {
        return Err(format!("unexpected index row: {}", line));
    };

    let timestamp: DateTime<Utc> = parse_wayback_timestamp(timestamp)
        .ok_or_else(|| format!("invalid timestamp in index row: {}", line))?;
    let wayback_ts = format_wayback_timestamp(&timestamp);

    Ok(CaptureRecord {
        key: key.to_string(),
        timestamp,
        url: url.to_string(),
        mime_type: optional(mime_type).map(str::to_string),
        status_code: optional(status_code).and_then(|s| s.parse().ok()),
        digest: optional(digest).map(str::to_string),
        length: optional(length).and_then(|s| s.parse().ok()),
        raw_url: format!("{}/{}id_/{}", web_url, wayback_ts, url),
        view_url: format!("{}/{}/{}", web_url, wayback_ts, url),
    })
}

fn optional(field: &str) -> Option<&str> {
    (field != "-").then_some(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use chrono::TimeZone;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WEB: &str = "https://web.archive.org/web";

    #[test]
    fn test_parse_rows_and_resume_key() {
        let body = "gov,epa)/ 20200102030405 https://www.epa.gov/ text/html 200 ABCDEF 1234\n\
                    gov,epa)/ 20200103000000 https://www.epa.gov/ - - GHIJKL -\n\
                    \n\
                    gov%2Cepa%29%2F+20200103000001\n";
        let page = parse_cdx(body, WEB).unwrap();

        assert_eq!(page.records.len(), 2);
        let first = &page.records[0];
        assert_eq!(first.key, "gov,epa)/");
        assert_eq!(
            first.timestamp,
            Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(first.mime_type.as_deref(), Some("text/html"));
        assert_eq!(first.status_code, Some(200));
        assert_eq!(first.length, Some(1234));
        assert_eq!(
            first.raw_url,
            "https://web.archive.org/web/20200102030405id_/https://www.epa.gov/"
        );
        assert_eq!(
            first.view_url,
            "https://web.archive.org/web/20200102030405/https://www.epa.gov/"
        );

        let second = &page.records[1];
        assert!(second.mime_type.is_none());
        assert!(second.status_code.is_none());
        assert!(second.length.is_none());
        assert_eq!(page.resume_key.as_deref(), Some("gov%2Cepa%29%2F+20200103000001"));
    }

    #[test]
    fn test_parse_rejects_short_rows() {
        assert!(parse_cdx("gov,epa)/ 20200102030405 https://www.epa.gov/\n", WEB).is_err());
    }

    fn client(server: &MockServer) -> WaybackClient {
        let config = WaybackConfig {
            cdx_url: format!("{}/cdx/search/cdx", server.uri()),
            web_url: WEB.to_string(),
            page_size: 2,
            index_retry: RetryPolicy::new(0, 0.0, Duration::from_secs(5)),
            user_agent: "test".to_string(),
        };
        WaybackClient::new(&config).unwrap()
    }

    fn query(url: &str, skip_repeats: bool) -> CdxQuery {
        CdxQuery {
            url: url.to_string(),
            from: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
            to: None,
            skip_repeats,
        }
    }

    #[tokio::test]
    async fn test_list_page_sends_query_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cdx/search/cdx"))
            .and(query_param("url", "https://www.epa.gov/"))
            .and(query_param("from", "20200101000000"))
            .and(query_param("limit", "2"))
            .and(query_param("collapse", "digest"))
            .and(query_param("resumeKey", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "gov,epa)/ 20200102030405 https://www.epa.gov/ text/html 200 ABCDEF 1234\n",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server)
            .list_page(&query("https://www.epa.gov/", true), Some("abc"))
            .await
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.resume_key.is_none());
    }

    #[tokio::test]
    async fn test_list_page_classifies_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("url", "https://blocked.gov/"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string("org.archive.wayback.exception.AdministrativeAccessControlException: Blocked Site Error"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("url", "https://empty.gov/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("url", "https://broken.gov/"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(matches!(
            client.list_page(&query("https://blocked.gov/", false), None).await,
            Err(ListError::BlockedByPolicy { .. })
        ));
        assert!(matches!(
            client.list_page(&query("https://empty.gov/", false), None).await,
            Err(ListError::NoArchivedVersions { .. })
        ));
        assert!(matches!(
            client.list_page(&query("https://broken.gov/", false), None).await,
            Err(ListError::Index { .. })
        ));
    }
}
