//! TTL expiry for skip-cache entries

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;

/// Pruning statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneStats {
    pub kept: usize,
    pub pruned: usize,
}

/// Oldest failure time that survives a prune at `now`
pub fn cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
    now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Drop entries whose last failure is older than `now - ttl`
pub fn prune_expired(
    entries: &DashMap<String, DateTime<Utc>>,
    now: DateTime<Utc>,
    ttl: Duration,
) -> PruneStats {
    let cutoff = cutoff(now, ttl);
    let before = entries.len();
    entries.retain(|_, failed_at| *failed_at >= cutoff);
    let kept = entries.len();

    let stats = PruneStats {
        kept,
        pruned: before.saturating_sub(kept),
    };
    debug!(%cutoff, ?stats, "Pruned skip-cache");
    stats
}
