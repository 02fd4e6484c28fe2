//! Progress observation for running searches.
//!
//! Reporters only observe coordinator state; nothing they do affects the
//! result of a search.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

/// Point-in-time view of a running search.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressSnapshot {
    /// Sources the search was dispatched to.
    pub total: usize,
    /// Sources that have not reported yet.
    pub pending: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Display names of the sources still running.
    pub pending_sources: Vec<String>,
}

impl ProgressSnapshot {
    /// Completed share of sources, 0-100.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let done = self.total.saturating_sub(self.pending);
        ((done * 100) / self.total) as u8
    }

    /// Human readable status line.
    pub fn message(&self) -> String {
        match self.pending {
            0 => "All sources finished".to_string(),
            1 => format!(
                "Waiting for {}",
                self.pending_sources
                    .first()
                    .map(String::as_str)
                    .unwrap_or("1 source")
            ),
            n => format!("Waiting for {} sources", n),
        }
    }
}

/// Observer of search progress.
pub trait ProgressReporter: Send + Sync {
    /// Called once after all workers were launched.
    fn started(&self, _snapshot: &ProgressSnapshot) {}

    /// Called on every poll of the wait loop.
    fn update(&self, snapshot: &ProgressSnapshot);

    /// Called once when the coordinator stops waiting. A non-zero `pending`
    /// means the listed sources did not respond in time.
    fn finished(&self, _snapshot: &ProgressSnapshot) {}
}

/// Reporter that ignores everything (silent searches).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn update(&self, _snapshot: &ProgressSnapshot) {}
}

/// Reporter that logs progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn started(&self, snapshot: &ProgressSnapshot) {
        info!(
            sources = snapshot.total,
            timeout_ms = snapshot.timeout.as_millis() as u64,
            "Search started"
        );
    }

    fn update(&self, snapshot: &ProgressSnapshot) {
        debug!(
            elapsed_ms = snapshot.elapsed.as_millis() as u64,
            timeout_ms = snapshot.timeout.as_millis() as u64,
            percent = snapshot.percent(),
            "{}",
            snapshot.message()
        );
    }

    fn finished(&self, snapshot: &ProgressSnapshot) {
        if snapshot.pending > 0 {
            warn!(
                "{} did not respond in time",
                snapshot.pending_sources.join(", ")
            );
        }
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(total: usize, pending: usize, names: &[&str]) -> ProgressSnapshot {
        ProgressSnapshot {
            total,
            pending,
            elapsed: Duration::from_millis(1500),
            timeout: Duration::from_secs(10),
            pending_sources: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_percent() {
        assert_eq!(snapshot(4, 4, &[]).percent(), 0);
        assert_eq!(snapshot(4, 1, &[]).percent(), 75);
        assert_eq!(snapshot(4, 0, &[]).percent(), 100);
        assert_eq!(snapshot(0, 0, &[]).percent(), 100);
    }

    #[test]
    fn test_message() {
        assert_eq!(snapshot(3, 2, &["A", "B"]).message(), "Waiting for 2 sources");
        assert_eq!(snapshot(3, 1, &["Slow"]).message(), "Waiting for Slow");
        assert_eq!(snapshot(3, 0, &[]).message(), "All sources finished");
    }

    #[test]
    fn test_snapshot_serializes_durations_as_millis() {
        let json = serde_json::to_value(snapshot(2, 1, &["A"])).unwrap();
        assert_eq!(json["elapsed"], 1500);
        assert_eq!(json["timeout"], 10000);
    }
}
