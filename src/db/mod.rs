//! web-monitoring-db collaborator
//!
//! Lists tracked pages, submits import batches and watches import jobs.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::archive::ImportVersion;

pub use client::DbClient;
pub use error::{DbError, Result};
pub use types::{ImportJob, ImportJobId, ImportJobOptions, Page, PageChunk, PageQuery, UpdateMode};

#[async_trait]
pub trait MonitoringDb: Send + Sync {
    /// One chunk of active pages, oldest first
    async fn list_pages(&self, query: &PageQuery) -> Result<PageChunk>;

    /// Drain `versions` into import jobs, returning one job id per batch
    async fn add_versions(
        &self,
        versions: UnboundedReceiver<ImportVersion>,
        options: ImportJobOptions,
    ) -> Result<Vec<ImportJobId>>;

    /// Wait for every job to complete (or `cancel` to fire) and collect processing errors
    async fn monitor_import_statuses(
        &self,
        job_ids: &[ImportJobId],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>>;
}

/// Walk every chunk of the page listing
pub async fn list_all_pages(
    db: &dyn MonitoringDb,
    url_pattern: Option<&str>,
    chunk_size: usize,
) -> Result<Vec<Page>> {
    let mut pages = Vec::new();
    let mut query = PageQuery {
        chunk: 1,
        chunk_size,
        url_pattern: url_pattern.map(str::to_string),
    };

    loop {
        let chunk = db.list_pages(&query).await?;
        debug!(chunk = query.chunk, count = chunk.pages.len(), "Loaded page chunk");
        pages.extend(chunk.pages);
        if !chunk.has_next {
            break;
        }
        query.chunk += 1;
    }

    Ok(pages)
}
