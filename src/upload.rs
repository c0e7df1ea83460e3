//! Delivering fetched versions to web-monitoring-db

use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::archive::ImportVersion;
use crate::db::{DbError, ImportJobId, ImportJobOptions, MonitoringDb};

/// Where versions go at the end of the pipeline
#[derive(Clone)]
pub enum UploadTarget {
    /// Print each version as a JSON line instead of importing
    DryRun,
    Database {
        db: Arc<dyn MonitoringDb>,
        options: ImportJobOptions,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub versions_logged: u64,
    pub job_ids: Vec<ImportJobId>,
    /// Processing errors reported by finished import jobs
    pub errors: Vec<String>,
}

/// Drain `versions` into the target until the channel closes
pub async fn upload(
    versions: UnboundedReceiver<ImportVersion>,
    target: UploadTarget,
    cancel: CancellationToken,
) -> Result<UploadReport, DbError> {
    match target {
        UploadTarget::DryRun => Ok(log_versions(versions, std::io::stdout()).await),
        UploadTarget::Database { db, options } => {
            let job_ids = db.add_versions(versions, options).await?;
            info!(jobs = ?job_ids, "Import jobs submitted");
            info!("Polling web-monitoring-db until import jobs are finished...");

            let errors = db.monitor_import_statuses(&job_ids, &cancel).await?;
            for error in &errors {
                warn!(%error, "Import job reported an error");
            }

            Ok(UploadReport {
                versions_logged: 0,
                job_ids,
                errors,
            })
        }
    }
}

async fn log_versions(mut versions: UnboundedReceiver<ImportVersion>, mut out: impl Write) -> UploadReport {
    let mut report = UploadReport::default();

    while let Some(version) = versions.recv().await {
        match serde_json::to_string(&version) {
            Ok(line) => {
                if let Err(e) = writeln!(out, "{}", line) {
                    warn!(error = %e, "Could not write version");
                }
                report.versions_logged += 1;
            }
            Err(e) => warn!(page = %version.page_url, error = %e, "Could not serialize version"),
        }
    }

    report
}
