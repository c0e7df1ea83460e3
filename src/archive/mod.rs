//! Web-archive collaborators: index listing and memento fetching
//!
//! The pipeline only talks to the archive through the traits below, so tests
//! can substitute scripted implementations for the Wayback Machine clients.

pub mod cdx;
pub mod error;
pub mod memento;
pub mod session;
pub mod types;

use async_trait::async_trait;

use crate::config::RetryPolicy;

pub use cdx::WaybackClient;
pub use error::{FetchError, FetchResult, ListError};
pub use memento::WaybackSessionFactory;
pub use session::WaybackSession;
pub use types::{CaptureRecord, CdxPage, CdxQuery, ImportVersion, SourceMetadata, VersionAnnotations};

/// Lists captures known to the archive index
#[async_trait]
pub trait ArchiveIndex: Send + Sync {
    /// Fetch one page of captures; pass the previous page's resume key to continue
    async fn list_page(
        &self,
        query: &CdxQuery,
        resume_key: Option<&str>,
    ) -> Result<CdxPage, ListError>;
}

/// Loads archived content for a capture
#[async_trait]
pub trait MementoSession: Send + Sync {
    async fn fetch_version(
        &self,
        record: &CaptureRecord,
        annotations: &VersionAnnotations,
    ) -> FetchResult<ImportVersion>;
}

/// Builds network sessions bound to a retry policy
pub trait SessionFactory: Send + Sync {
    fn open(&self, policy: &RetryPolicy) -> FetchResult<Box<dyn MementoSession>>;
}
