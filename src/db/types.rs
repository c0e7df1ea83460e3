use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A page tracked by web-monitoring-db
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub uuid: Uuid,
    pub url: String,
    /// SURT-style key; older records may not have one
    #[serde(default)]
    pub url_key: Option<String>,
}

/// Parameters for one chunk of the page listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    /// 1-based chunk number
    pub chunk: u32,
    pub chunk_size: usize,
    /// Server-side URL pattern (`*` wildcards)
    pub url_pattern: Option<String>,
}

/// One chunk of pages and whether another follows
#[derive(Debug, Clone, Default)]
pub struct PageChunk {
    pub pages: Vec<Page>,
    pub has_next: bool,
}

/// How the database treats versions it already has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    #[default]
    Skip,
    Replace,
}

impl UpdateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateMode::Skip => "skip",
            UpdateMode::Replace => "replace",
        }
    }
}

/// Options attached to every import job of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportJobOptions {
    pub update: UpdateMode,
    /// Create pages for unknown URLs instead of rejecting the version
    pub create_pages: bool,
    /// Let the database drop versions identical to their predecessor
    pub skip_unchanged_versions: bool,
}

impl Default for ImportJobOptions {
    fn default() -> Self {
        Self {
            update: UpdateMode::Skip,
            create_pages: true,
            skip_unchanged_versions: true,
        }
    }
}

pub type ImportJobId = u64;

/// Import job state as reported by the database
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportJob {
    pub id: ImportJobId,
    pub status: String,
    #[serde(default)]
    pub processing_errors: Vec<String>,
}

impl ImportJob {
    pub fn is_complete(&self) -> bool {
        self.status == "complete"
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageListing {
    pub data: Vec<Page>,
    #[serde(default)]
    pub links: Links,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Links {
    #[serde(default)]
    pub next: Option<String>,
}
