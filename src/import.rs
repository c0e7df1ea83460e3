//! Import runs: wiring the lister, worker pool, dedup relay and uploader together

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::{
    ArchiveIndex, FetchError, SessionFactory, VersionAnnotations, WaybackClient,
    WaybackSessionFactory,
};
use crate::cache::{CacheError, UnplaybackableCache};
use crate::config::{Config, RetryPolicy, SkipUnchanged};
use crate::db::{self, DbClient, DbError, ImportJobOptions, MonitoringDb};
use crate::dedup::{self, ChangeFilter, RelayStats};
use crate::lister::{ListOptions, ListSummary, RecordLister};
use crate::summary::RunSummary;
use crate::upload::{self, UploadReport, UploadTarget};
use crate::worker::{PoolError, WorkerPool};
use crate::worklist::{self, MembershipFilter, PageFilter, QueryTarget};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Skip-cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Archive client error: {0}")]
    Archive(#[from] FetchError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// Per-run import settings
#[derive(Debug, Clone, bon::Builder)]
pub struct ImportOptions {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    #[builder(default)]
    pub maintainers: Vec<String>,
    #[builder(default)]
    pub tags: Vec<String>,
    #[builder(default)]
    pub skip_unchanged: SkipUnchanged,
    #[builder(default = 10)]
    pub parallel: usize,
    pub unplaybackable_path: Option<PathBuf>,
    #[builder(default = Duration::from_secs(7 * 86_400))]
    pub unplaybackable_ttl: Duration,
    #[builder(default = vec![RetryPolicy::default()])]
    pub retry_tiers: Vec<RetryPolicy>,
    /// Log versions instead of importing them
    #[builder(default)]
    pub dry_run: bool,
    /// Let the database create pages for URLs it does not track yet
    #[builder(default = true)]
    pub create_pages: bool,
}

impl ImportOptions {
    fn annotations(&self) -> VersionAnnotations {
        VersionAnnotations {
            maintainers: self.maintainers.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Everything one run produced
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub summary: RunSummary,
    pub listing: ListSummary,
    pub relay: RelayStats,
    pub upload: UploadReport,
}

/// Runs imports against a set of collaborators
pub struct Importer {
    index: Arc<dyn ArchiveIndex>,
    sessions: Arc<dyn SessionFactory>,
    db: Option<Arc<dyn MonitoringDb>>,
    cancel: CancellationToken,
}

impl Importer {
    pub fn new(
        index: Arc<dyn ArchiveIndex>,
        sessions: Arc<dyn SessionFactory>,
        db: Option<Arc<dyn MonitoringDb>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            index,
            sessions,
            db,
            cancel,
        }
    }

    /// Import every capture of `targets` accepted by `filter`
    pub async fn run(
        &self,
        targets: Vec<QueryTarget>,
        filter: MembershipFilter,
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        let upload_target = if options.dry_run {
            UploadTarget::DryRun
        } else {
            let db = self.db.clone().ok_or(DbError::MissingCredentials)?;
            UploadTarget::Database {
                db,
                options: ImportJobOptions {
                    create_pages: options.create_pages,
                    ..ImportJobOptions::default()
                },
            }
        };
        let cache = Arc::new(UnplaybackableCache::load(
            options.unplaybackable_path.as_deref(),
            options.unplaybackable_ttl,
        )?);

        // Stops the lister if the pool fails, without cancelling the caller's token
        let run_cancel = self.cancel.child_token();

        let (records_tx, records_rx) = mpsc::unbounded_channel();
        let (versions_tx, versions_rx) = mpsc::unbounded_channel();
        let (upload_tx, upload_rx) = mpsc::unbounded_channel();

        let change_filter = options
            .skip_unchanged
            .filter_fetched()
            .then(ChangeFilter::new);
        let relay = tokio::spawn(dedup::relay(versions_rx, upload_tx, change_filter));
        let uploader = tokio::spawn(upload::upload(upload_rx, upload_target, run_cancel.clone()));

        let lister = RecordLister::new(
            Arc::clone(&self.index),
            Arc::new(filter),
            ListOptions {
                from: options.from_date,
                to: options.to_date,
                skip_repeats: options.skip_unchanged.collapse_in_index(),
            },
            run_cancel.clone(),
        );
        let listing = tokio::spawn(lister.run(targets, records_tx));

        let pool = WorkerPool::new(
            options.retry_tiers.clone(),
            options.parallel,
            Arc::clone(&self.sessions),
            Arc::clone(&cache),
            options.annotations(),
            run_cancel.clone(),
        );
        let summary = match pool.run(records_rx, versions_tx).await {
            Ok(summary) => summary,
            Err(error) => {
                warn!(%error, "Worker pool failed, stopping the run");
                run_cancel.cancel();
                // Keep playback failures recorded by finished tiers
                if let Err(save_error) = save_cache(&cache, options) {
                    warn!(error = %save_error, "Could not save skip-cache");
                }
                wind_down(listing, relay, uploader).await;
                return Err(error.into());
            }
        };

        info!("\n{}", summary);
        save_cache(&cache, options)?;

        let listing = listing.await?;
        let relay = relay.await?;
        let upload = uploader.await??;
        if !upload.errors.is_empty() {
            warn!(count = upload.errors.len(), "Import jobs finished with errors");
        }

        Ok(ImportReport {
            summary,
            listing,
            relay,
            upload,
        })
    }
}

fn save_cache(cache: &UnplaybackableCache, options: &ImportOptions) -> Result<()> {
    if options.dry_run {
        debug!("Dry run, not saving skip-cache");
    } else if cache.path().is_some() {
        info!("Saving list of non-playbackable URLs...");
        cache.save(Utc::now())?;
    }
    Ok(())
}

/// Wait for the other stages after a failed pool run; their channels are closed by now
async fn wind_down(
    listing: JoinHandle<ListSummary>,
    relay: JoinHandle<RelayStats>,
    uploader: JoinHandle<std::result::Result<UploadReport, DbError>>,
) {
    if let Err(error) = listing.await {
        warn!(%error, "Lister task failed");
    }
    if let Err(error) = relay.await {
        warn!(%error, "Dedup relay task failed");
    }
    match uploader.await {
        Ok(Ok(report)) if !report.job_ids.is_empty() => {
            warn!(jobs = ?report.job_ids, "Import jobs were submitted before the run failed");
        }
        Ok(Ok(_)) => {}
        Ok(Err(error)) => warn!(%error, "Upload failed"),
        Err(error) => warn!(%error, "Upload task failed"),
    }
}

/// Import captures of explicit URLs (or wildcard patterns)
pub async fn import_urls(
    config: &Config,
    urls: Vec<String>,
    options: ImportOptions,
    cancel: CancellationToken,
) -> Result<ImportReport> {
    let db = connect_db(config, options.dry_run)?;
    let importer = wayback_importer(config, db, cancel)?;
    let targets = urls.into_iter().map(QueryTarget::Url).collect();
    let filter = MembershipFilter::Pages(PageFilter::new(&config.filter));

    importer.run(targets, filter, &options).await
}

/// Import captures of every page web-monitoring-db tracks (optionally matching `pattern`)
pub async fn import_known_pages(
    config: &Config,
    pattern: Option<&str>,
    options: ImportOptions,
    cancel: CancellationToken,
) -> Result<ImportReport> {
    // Listing pages needs the database even on a dry run
    let db: Arc<dyn MonitoringDb> = Arc::new(DbClient::from_config(&config.database)?);
    let worklist = load_worklist(db.as_ref(), config, pattern).await?;
    let targets = worklist::collapse_www(&worklist.targets);

    info!("Found {} CDX-queryable URLs", targets.len());
    debug!(
        "\n  {}",
        targets.iter().map(|t| t.to_string()).collect::<Vec<_>>().join("\n  ")
    );

    let importer = wayback_importer(config, Some(db), cancel)?;
    let options = ImportOptions {
        create_pages: false,
        ..options
    };
    importer.run(targets, worklist.filter, &options).await
}

/// Query targets for the tracked pages matching `pattern`
pub async fn list_domains(config: &Config, pattern: Option<&str>) -> Result<Vec<QueryTarget>> {
    let db = DbClient::from_config(&config.database)?;
    let worklist = load_worklist(&db, config, pattern).await?;
    Ok(worklist.targets)
}

async fn load_worklist(
    db: &dyn MonitoringDb,
    config: &Config,
    pattern: Option<&str>,
) -> Result<worklist::Worklist> {
    info!("Loading known pages from web-monitoring-db instance...");
    let pages = db::list_all_pages(db, pattern, config.worklist.page_chunk_size).await?;
    debug!(pages = pages.len(), "Loaded known pages");
    Ok(worklist::build_worklist(
        &pages,
        &config.worklist,
        PageFilter::new(&config.filter),
    ))
}

fn connect_db(config: &Config, dry_run: bool) -> Result<Option<Arc<dyn MonitoringDb>>> {
    if dry_run {
        return Ok(None);
    }
    let db: Arc<dyn MonitoringDb> = Arc::new(DbClient::from_config(&config.database)?);
    Ok(Some(db))
}

fn wayback_importer(
    config: &Config,
    db: Option<Arc<dyn MonitoringDb>>,
    cancel: CancellationToken,
) -> Result<Importer> {
    let index: Arc<dyn ArchiveIndex> = Arc::new(WaybackClient::new(&config.wayback)?);
    let sessions: Arc<dyn SessionFactory> =
        Arc::new(WaybackSessionFactory::new(config.wayback.user_agent.clone()));
    Ok(Importer::new(index, sessions, db, cancel))
}
