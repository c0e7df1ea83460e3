//! Record runner - fetches individual capture records

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::{
    CaptureRecord, FetchError, ImportVersion, MementoSession, SessionFactory, VersionAnnotations,
};
use crate::cache::UnplaybackableCache;
use crate::config::RetryPolicy;
use crate::queue::SharedReceiver;
use crate::summary::RunSummary;

/// Final state of one record within a tier
#[derive(Debug)]
pub enum RecordOutcome {
    Success(ImportVersion),
    /// Could not be played back, now or on an earlier run
    Playback,
    Missing,
    /// Anything else; worth another try under a more tolerant policy
    Unknown(FetchError),
}

/// Run-wide state shared by every worker
pub struct WorkerContext {
    pub factory: Arc<dyn SessionFactory>,
    pub cache: Arc<UnplaybackableCache>,
    pub annotations: VersionAnnotations,
    pub cancel: CancellationToken,
}

/// Channels one worker reads from and writes to within a tier
pub struct WorkerChannels {
    pub records: SharedReceiver<CaptureRecord>,
    pub versions: UnboundedSender<ImportVersion>,
    /// Next tier's input; `None` on the last tier
    pub retry: Option<UnboundedSender<CaptureRecord>>,
}

/// A worker with its own network session
pub struct RecordRunner {
    id: usize,
    tier: usize,
    policy: RetryPolicy,
    session: Box<dyn MementoSession>,
    context: Arc<WorkerContext>,
}

impl RecordRunner {
    pub fn new(
        id: usize,
        tier: usize,
        policy: RetryPolicy,
        session: Box<dyn MementoSession>,
        context: Arc<WorkerContext>,
    ) -> Self {
        Self {
            id,
            tier,
            policy,
            session,
            context,
        }
    }

    /// Pull records until the channel closes or the run is cancelled
    pub async fn run(mut self, channels: WorkerChannels) -> RunSummary {
        let mut summary = RunSummary::default();
        let cancel = self.context.cancel.clone();

        loop {
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(worker = self.id, tier = self.tier, "Cancelled, not taking more records");
                    break;
                }
                record = channels.records.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
            };
            summary.total += 1;

            match self.handle_record(&record).await {
                RecordOutcome::Success(version) => {
                    summary.success += 1;
                    if channels.versions.send(version).is_err() {
                        warn!(url = %record.raw_url, "Version channel closed, dropping version");
                    }
                }
                RecordOutcome::Playback => summary.playback += 1,
                RecordOutcome::Missing => summary.missing += 1,
                RecordOutcome::Unknown(error) => {
                    summary.unknown += 1;
                    match &channels.retry {
                        Some(retry) => {
                            info!(tier = self.tier, %error, "Fetch failed, will retry");
                            if retry.send(record).is_err() {
                                warn!(tier = self.tier, "Retry channel closed, dropping record");
                            }
                        }
                        None => warn!(
                            tier = self.tier,
                            url = %record.url,
                            raw_url = %record.raw_url,
                            timestamp = %record.timestamp,
                            error = ?error,
                            "Giving up on record after final retry tier"
                        ),
                    }
                }
            }
        }

        debug!(worker = self.id, tier = self.tier, ?summary, "Worker finished");
        summary
    }

    /// Fetch one record and classify the result
    pub async fn handle_record(&mut self, record: &CaptureRecord) -> RecordOutcome {
        if self.context.cache.contains(&record.raw_url) {
            debug!(url = %record.raw_url, "Known unplaybackable memento, skipping");
            return RecordOutcome::Playback;
        }

        match self.fetch(record).await {
            Ok(version) => RecordOutcome::Success(version),
            Err(error @ FetchError::Playback { .. }) => {
                self.context.cache.mark(&record.raw_url, Utc::now());
                info!(%error);
                RecordOutcome::Playback
            }
            Err(FetchError::NotFound { url }) => {
                info!(%url, "Missing memento");
                RecordOutcome::Missing
            }
            Err(error) => RecordOutcome::Unknown(error),
        }
    }

    /// Fetch, replacing the session and trying once more if it can no longer connect
    async fn fetch(&mut self, record: &CaptureRecord) -> Result<ImportVersion, FetchError> {
        let mut session_reset = false;

        loop {
            let result = self
                .session
                .fetch_version(record, &self.context.annotations)
                .await;

            match result {
                Err(error) if error.is_connection_failure() && !session_reset => {
                    session_reset = true;
                    debug!(worker = self.id, %error, "Connection failed, resetting session");
                    match self.context.factory.open(&self.policy) {
                        Ok(session) => self.session = session,
                        Err(open_error) => {
                            warn!(worker = self.id, error = %open_error, "Could not reset session");
                            return Err(error);
                        }
                    }
                }
                other => return other,
            }
        }
    }
}
