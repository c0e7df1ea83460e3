//! Suppressing consecutive unchanged versions
//!
//! Versions arrive from a pool of workers, so two captures of the same page
//! can reach the filter out of capture-time order. The filter compares against
//! whatever it saw last for the page, not against the chronologically previous
//! capture.

use std::collections::HashMap;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::archive::ImportVersion;
use crate::observability::ProgressMeter;

/// Last emitted content hash per page
#[derive(Debug, Default)]
pub struct ChangeFilter {
    last_hashes: HashMap<String, String>,
}

impl ChangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `version` differs from the last version seen for its page
    pub fn should_emit(&mut self, version: &ImportVersion) -> bool {
        match self.last_hashes.get(&version.page_url) {
            Some(hash) if *hash == version.version_hash => false,
            _ => {
                self.last_hashes
                    .insert(version.page_url.clone(), version.version_hash.clone());
                true
            }
        }
    }
}

/// Counts from one relay run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub forwarded: u64,
    pub unchanged: u64,
}

/// Forward versions to the uploader, dropping unchanged ones when a filter is set
///
/// Ends when the input closes; dropping `output` then closes the uploader's input.
pub async fn relay(
    mut input: UnboundedReceiver<ImportVersion>,
    output: UnboundedSender<ImportVersion>,
    mut filter: Option<ChangeFilter>,
) -> RelayStats {
    let mut stats = RelayStats::default();
    let mut progress = ProgressMeter::new("importing", ProgressMeter::DEFAULT_INTERVAL);

    while let Some(version) = input.recv().await {
        let unchanged = filter.as_mut().is_some_and(|f| !f.should_emit(&version));
        if unchanged {
            debug!(page = %version.page_url, hash = %version.version_hash, "Skipping unchanged version");
            stats.unchanged += 1;
            continue;
        }
        if output.send(version).is_err() {
            debug!("Uploader stopped, draining remaining versions");
            continue;
        }
        stats.forwarded += 1;
        progress.tick();
    }

    progress.finish();
    stats
}
