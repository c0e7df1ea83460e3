//! Persistent skip-cache of mementos that could not be played back
//!
//! Loaded once at the start of a run, updated concurrently by workers, and
//! pruned to a TTL and written back at the end of the run. The file is a flat
//! JSON object of memento URL to last failure time (`YYYY-MM-DDTHH:MM:SSZ`).

pub mod error;
pub mod pruning;
pub mod store;

pub use error::{CacheError, Result};
pub use pruning::PruneStats;
pub use store::{CACHE_TIMESTAMP_FORMAT, UnplaybackableCache};
