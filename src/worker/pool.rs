//! Retry-tiered worker pool
//!
//! Tier 0 drains the listed records. Each later tier drains only the records
//! the previous tier could not resolve, with a more tolerant network policy.
//! Tiers run one after another; within a tier `parallel` workers share the
//! input channel.

use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::PoolError;
use super::runner::{RecordRunner, WorkerChannels, WorkerContext};
use crate::archive::{CaptureRecord, ImportVersion, SessionFactory, VersionAnnotations};
use crate::cache::UnplaybackableCache;
use crate::config::RetryPolicy;
use crate::queue::SharedReceiver;
use crate::summary::RunSummary;

pub struct WorkerPool {
    tiers: Vec<RetryPolicy>,
    parallel: usize,
    context: Arc<WorkerContext>,
}

impl WorkerPool {
    pub fn new(
        tiers: Vec<RetryPolicy>,
        parallel: usize,
        factory: Arc<dyn SessionFactory>,
        cache: Arc<UnplaybackableCache>,
        annotations: VersionAnnotations,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tiers,
            parallel: parallel.max(1),
            context: Arc::new(WorkerContext {
                factory,
                cache,
                annotations,
                cancel,
            }),
        }
    }

    /// Run every tier and return the merged summary
    pub async fn run(
        &self,
        records: UnboundedReceiver<CaptureRecord>,
        versions: UnboundedSender<ImportVersion>,
    ) -> Result<RunSummary, PoolError> {
        let mut input = SharedReceiver::new(records);
        let mut run = RunSummary::default();

        for (tier, policy) in self.tiers.iter().enumerate() {
            let last_tier = tier + 1 == self.tiers.len();
            let (retry_tx, retry_rx) = if last_tier {
                (None, None)
            } else {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(tx), Some(rx))
            };

            let tier_summary = self
                .run_tier(tier, policy, input, versions.clone(), retry_tx)
                .await?;

            if tier == 0 {
                run = tier_summary;
            } else {
                run.absorb_retry(&tier_summary);
            }
            debug_assert!(run.is_consistent(), "summary out of balance: {run:?}");
            info!(
                tier,
                total = tier_summary.total,
                success = tier_summary.success,
                unknown = tier_summary.unknown,
                "Tier finished"
            );

            match retry_rx {
                Some(rx) if tier_summary.unknown > 0 && !self.context.cancel.is_cancelled() => {
                    info!("Retrying about {} failed records...", tier_summary.unknown);
                    input = SharedReceiver::new(rx);
                }
                _ => break,
            }
        }

        Ok(run)
    }

    async fn run_tier(
        &self,
        tier: usize,
        policy: &RetryPolicy,
        records: SharedReceiver<CaptureRecord>,
        versions: UnboundedSender<ImportVersion>,
        retry: Option<UnboundedSender<CaptureRecord>>,
    ) -> Result<RunSummary, PoolError> {
        debug!(tier, workers = self.parallel, ?policy, "Starting tier");

        // Open every session before any worker starts draining records
        let sessions = (0..self.parallel)
            .map(|_| self.context.factory.open(policy))
            .collect::<Result<Vec<_>, _>>()?;

        let mut handles = Vec::with_capacity(self.parallel);
        for (id, session) in sessions.into_iter().enumerate() {
            let runner = RecordRunner::new(id, tier, policy.clone(), session, Arc::clone(&self.context));
            let channels = WorkerChannels {
                records: records.clone(),
                versions: versions.clone(),
                retry: retry.clone(),
            };
            handles.push(tokio::spawn(runner.run(channels)));
        }
        // Workers hold the only remaining retry senders, so the next tier's
        // channel closes once they finish
        drop(retry);

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.await?);
        }
        Ok(RunSummary::merge(&summaries))
    }
}
