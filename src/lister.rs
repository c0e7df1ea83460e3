//! Listing capture records for a worklist
//!
//! Walks each query target's index pages and feeds matching records into the
//! worker pool's channel. A failing target is logged and skipped; the lister
//! always moves on so the pool is never left waiting on a dead producer.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archive::{ArchiveIndex, CaptureRecord, CdxQuery, ListError};
use crate::worklist::{MembershipFilter, QueryTarget};

/// Date range and index-level collapsing for every target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Ask the index to collapse consecutive identical captures
    pub skip_repeats: bool,
}

/// Counts from one listing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListSummary {
    pub listed: u64,
    pub skipped: u64,
    pub failed_targets: u64,
}

pub struct RecordLister {
    index: Arc<dyn ArchiveIndex>,
    filter: Arc<MembershipFilter>,
    options: ListOptions,
    cancel: CancellationToken,
}

impl RecordLister {
    pub fn new(
        index: Arc<dyn ArchiveIndex>,
        filter: Arc<MembershipFilter>,
        options: ListOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            index,
            filter,
            options,
            cancel,
        }
    }

    /// List every target into `records`; dropping `records` at the end closes the channel
    pub async fn run(
        self,
        targets: Vec<QueryTarget>,
        records: UnboundedSender<CaptureRecord>,
    ) -> ListSummary {
        let mut summary = ListSummary::default();

        for target in &targets {
            if self.cancel.is_cancelled() {
                debug!("Cancelled, not listing more targets");
                break;
            }

            match self.list_target(target, &records, &mut summary).await {
                Ok(()) => {}
                Err(ListError::NoArchivedVersions { url }) => {
                    debug!(%url, "No archived versions");
                }
                Err(error @ ListError::BlockedByPolicy { .. }) => {
                    warn!(%error);
                    summary.failed_targets += 1;
                }
                Err(error) => {
                    error!(%target, %error, "Error getting CDX data");
                    summary.failed_targets += 1;
                }
            }
        }

        if summary.skipped > 0 {
            info!("Skipped {} URLs that did not match filters", summary.skipped);
        }
        info!(
            listed = summary.listed,
            skipped = summary.skipped,
            failed_targets = summary.failed_targets,
            "Finished listing captures"
        );
        summary
    }

    async fn list_target(
        &self,
        target: &QueryTarget,
        records: &UnboundedSender<CaptureRecord>,
        summary: &mut ListSummary,
    ) -> Result<(), ListError> {
        let query = CdxQuery {
            url: target.query_url(),
            from: self.options.from,
            to: self.options.to,
            skip_repeats: self.options.skip_repeats,
        };
        let mut resume_key: Option<String> = None;

        loop {
            let page = self.index.list_page(&query, resume_key.as_deref()).await?;

            for record in page.records {
                if self.cancel.is_cancelled() {
                    return Ok(());
                }
                if !self.filter.accepts(&record) {
                    debug!(url = %record.url, "Skipping URL");
                    summary.skipped += 1;
                    continue;
                }
                if records.send(record).is_err() {
                    // Nobody is consuming; stop listing this target
                    return Ok(());
                }
                summary.listed += 1;
            }

            match page.resume_key {
                Some(key) if !self.cancel.is_cancelled() => resume_key = Some(key),
                _ => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::CdxPage;
    use crate::config::PageFilterConfig;
    use crate::worklist::PageFilter;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    fn record(url: &str, mime: &str) -> CaptureRecord {
        CaptureRecord {
            key: url.to_string(),
            timestamp: Utc::now(),
            url: url.to_string(),
            mime_type: Some(mime.to_string()),
            status_code: Some(200),
            digest: None,
            length: None,
            raw_url: format!("https://web.archive.org/web/2020id_/{}", url),
            view_url: format!("https://web.archive.org/web/2020/{}", url),
        }
    }

    /// Index serving canned pages keyed by (query url, resume key)
    #[derive(Default)]
    struct ScriptedIndex {
        pages: HashMap<(String, Option<String>), CdxPage>,
        failures: HashMap<String, fn(String) -> ListError>,
    }

    #[async_trait]
    impl ArchiveIndex for ScriptedIndex {
        async fn list_page(
            &self,
            query: &CdxQuery,
            resume_key: Option<&str>,
        ) -> Result<CdxPage, ListError> {
            if let Some(make_error) = self.failures.get(&query.url) {
                return Err(make_error(query.url.clone()));
            }
            Ok(self
                .pages
                .get(&(query.url.clone(), resume_key.map(str::to_string)))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn lister(index: ScriptedIndex, cancel: CancellationToken) -> RecordLister {
        RecordLister::new(
            Arc::new(index),
            Arc::new(MembershipFilter::Pages(PageFilter::new(&PageFilterConfig::default()))),
            ListOptions::default(),
            cancel,
        )
    }

    #[tokio::test]
    async fn test_follows_resume_keys_and_filters() {
        let mut index = ScriptedIndex::default();
        index.pages.insert(
            ("https://epa.gov/".to_string(), None),
            CdxPage {
                records: vec![record("https://epa.gov/", "text/html"), record("https://epa.gov/a.css", "text/css")],
                resume_key: Some("next".to_string()),
            },
        );
        index.pages.insert(
            ("https://epa.gov/".to_string(), Some("next".to_string())),
            CdxPage {
                records: vec![record("https://epa.gov/air", "text/html")],
                resume_key: None,
            },
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = lister(index, CancellationToken::new())
            .run(vec![QueryTarget::Url("https://epa.gov/".to_string())], tx)
            .await;

        assert_eq!(summary, ListSummary { listed: 2, skipped: 1, failed_targets: 0 });
        assert_eq!(rx.recv().await.unwrap().url, "https://epa.gov/");
        assert_eq!(rx.recv().await.unwrap().url, "https://epa.gov/air");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failing_targets_do_not_stop_listing() {
        let mut index = ScriptedIndex::default();
        index.failures.insert("https://blocked.gov/".to_string(), |url| ListError::BlockedByPolicy {
            url,
            message: "Blocked Site Error".to_string(),
        });
        index.failures.insert("https://empty.gov/".to_string(), |url| ListError::NoArchivedVersions { url });
        index.failures.insert("https://broken.gov/".to_string(), |url| ListError::Index {
            url,
            message: "HTTP 400".to_string(),
        });
        index.pages.insert(
            ("https://epa.gov/".to_string(), None),
            CdxPage {
                records: vec![record("https://epa.gov/", "text/html")],
                resume_key: None,
            },
        );

        let targets = ["https://blocked.gov/", "https://empty.gov/", "https://broken.gov/", "https://epa.gov/"]
            .into_iter()
            .map(|u| QueryTarget::Url(u.to_string()))
            .collect();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = lister(index, CancellationToken::new()).run(targets, tx).await;

        assert_eq!(summary, ListSummary { listed: 1, skipped: 0, failed_targets: 2 });
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_lister_lists_nothing() {
        let mut index = ScriptedIndex::default();
        index.pages.insert(
            ("https://epa.gov/".to_string(), None),
            CdxPage {
                records: vec![record("https://epa.gov/", "text/html")],
                resume_key: None,
            },
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = lister(index, cancel)
            .run(vec![QueryTarget::Url("https://epa.gov/".to_string())], tx)
            .await;

        assert_eq!(summary.listed, 0);
        assert!(rx.recv().await.is_none());
    }
}
