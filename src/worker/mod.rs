//! Fetch workers
//!
//! A [`pool::WorkerPool`] turns capture records into import versions using a
//! fixed number of workers per retry tier. Record-level failures never fail the
//! pool; they end up in the [`RunSummary`](crate::summary::RunSummary).

pub mod pool;
pub mod runner;

use thiserror::Error;

use crate::archive::FetchError;

pub use pool::WorkerPool;
pub use runner::{RecordOutcome, RecordRunner};

/// Failures that stop the pool itself
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Could not open a fetch session: {0}")]
    Session(#[from] FetchError),

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
