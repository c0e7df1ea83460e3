//! Run statistics
//!
//! Raw counts are the only stored state; percentages are derived on demand
//! for reporting.

use serde::Serialize;
use std::fmt;
use std::ops::AddAssign;

/// Outcome counts for fetched capture records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: u64,
    pub success: u64,
    /// Captures the archive could not play back (including skip-cache hits)
    pub playback: u64,
    /// Captures with no memento behind them
    pub missing: u64,
    pub unknown: u64,
}

/// Share of `total` per outcome, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SummaryPercentages {
    pub success: f64,
    pub playback: f64,
    pub missing: f64,
    pub unknown: f64,
}

impl RunSummary {
    /// Records with a final outcome other than `unknown`
    pub fn resolved(&self) -> u64 {
        self.success + self.playback + self.missing
    }

    /// Whether every counted record has exactly one outcome
    pub fn is_consistent(&self) -> bool {
        self.resolved() + self.unknown == self.total
    }

    /// Sum summaries from workers of the same tier
    pub fn merge<'a>(summaries: impl IntoIterator<Item = &'a RunSummary>) -> RunSummary {
        summaries
            .into_iter()
            .fold(RunSummary::default(), |mut merged, summary| {
                merged += *summary;
                merged
            })
    }

    /// Fold in the result of a retry tier
    ///
    /// Every record a retry tier sees was counted as `unknown` by an earlier
    /// tier, so whatever it resolves moves out of `unknown`. The retry tier's
    /// own `total` and `unknown` are not added: those records are already
    /// counted here.
    pub fn absorb_retry(&mut self, retry: &RunSummary) {
        debug_assert!(
            retry.total <= self.unknown,
            "retry tier saw more records than were unresolved"
        );
        self.success += retry.success;
        self.playback += retry.playback;
        self.missing += retry.missing;
        self.unknown = self.unknown.saturating_sub(retry.resolved());
    }

    pub fn percentages(&self) -> SummaryPercentages {
        let pct = |count: u64| {
            if self.total == 0 {
                0.0
            } else {
                100.0 * count as f64 / self.total as f64
            }
        };
        SummaryPercentages {
            success: pct(self.success),
            playback: pct(self.playback),
            missing: pct(self.missing),
            unknown: pct(self.unknown),
        }
    }
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, other: RunSummary) {
        self.total += other.total;
        self.success += other.success;
        self.playback += other.playback;
        self.missing += other.missing;
        self.unknown += other.unknown;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = self.percentages();
        writeln!(f, "Loaded {} CDX records:", self.total)?;
        writeln!(f, "  {:6} successes ({:.2}%),", self.success, pct.success)?;
        writeln!(
            f,
            "  {:6} could not be played back ({:.2}%),",
            self.playback, pct.playback
        )?;
        writeln!(f, "  {:6} had no actual memento ({:.2}%),", self.missing, pct.missing)?;
        write!(f, "  {:6} unknown errors ({:.2}%).", self.unknown, pct.unknown)
    }
}
