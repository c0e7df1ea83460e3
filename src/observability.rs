//! Logging setup and progress reporting

use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber; `RUST_LOG` overrides the default `info` level
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed (e.g. by tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Counts items through a stage and logs throughput every `every` items
#[derive(Debug)]
pub struct ProgressMeter {
    label: &'static str,
    every: u64,
    count: u64,
    started: Instant,
}

impl ProgressMeter {
    pub const DEFAULT_INTERVAL: u64 = 100;

    pub fn new(label: &'static str, every: u64) -> Self {
        Self {
            label,
            every: every.max(1),
            count: 0,
            started: Instant::now(),
        }
    }

    pub fn tick(&mut self) {
        self.count += 1;
        if self.count % self.every == 0 {
            self.report();
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(&self) {
        self.report();
    }

    fn report(&self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.count as f64 / elapsed
        } else {
            0.0
        };
        info!(
            count = self.count,
            elapsed_secs = %format!("{:.1}", elapsed),
            per_sec = %format!("{:.2}", rate),
            "{} versions",
            self.label
        );
    }
}
