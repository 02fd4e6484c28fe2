//! Aggregate state owned by the coordinator for one search.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::deadline::Deadline;
use super::progress::ProgressSnapshot;
use super::NormalizedRecord;

#[derive(Debug)]
struct PendingSource {
    id: String,
    name: String,
}

#[derive(Debug, Default)]
struct StateInner {
    pending: Vec<PendingSource>,
    records: Vec<NormalizedRecord>,
    closed: bool,
}

/// Shared aggregate of a running search.
///
/// Workers only touch it through [`SearchState::record`], which appends a
/// source's results and removes it from the pending set in one step. The
/// pending count never increases.
#[derive(Debug)]
pub struct SearchState {
    total: usize,
    inner: Mutex<StateInner>,
}

impl SearchState {
    /// Create the state for the given `(id, display name)` sources.
    pub fn new<I, S1, S2>(sources: I) -> Self
    where
        I: IntoIterator<Item = (S1, S2)>,
        S1: Into<String>,
        S2: Into<String>,
    {
        let pending: Vec<_> = sources
            .into_iter()
            .map(|(id, name)| PendingSource {
                id: id.into(),
                name: name.into(),
            })
            .collect();

        Self {
            total: pending.len(),
            inner: Mutex::new(StateInner {
                pending,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the results of one source and mark it finished.
    ///
    /// Returns `false` when the results were discarded, either because the
    /// search already closed or the source had already reported.
    pub fn record(&self, source_id: &str, results: Vec<NormalizedRecord>) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        let Some(pos) = inner.pending.iter().position(|p| p.id == source_id) else {
            return false;
        };
        inner.pending.remove(pos);
        inner.records.extend(results);
        true
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Sources that have not reported yet.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Ids of the sources that have not reported. Stable once closed.
    pub fn pending_ids(&self) -> Vec<String> {
        self.lock().pending.iter().map(|p| p.id.clone()).collect()
    }

    pub fn snapshot(&self, deadline: &Deadline) -> ProgressSnapshot {
        let inner = self.lock();
        ProgressSnapshot {
            total: self.total,
            pending: inner.pending.len(),
            elapsed: deadline.elapsed(),
            timeout: deadline.budget(),
            pending_sources: inner.pending.iter().map(|p| p.name.clone()).collect(),
        }
    }

    /// Stop accepting results and take what was recorded, together with the
    /// display names of sources that never reported.
    pub fn close(&self) -> (Vec<NormalizedRecord>, Vec<String>) {
        let mut inner = self.lock();
        inner.closed = true;
        let records = std::mem::take(&mut inner.records);
        let missing = inner.pending.iter().map(|p| p.name.clone()).collect();
        (records, missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use std::time::Duration;

    fn state() -> SearchState {
        SearchState::new([("a", "Alpha"), ("b", "Beta"), ("c", "Gamma")])
    }

    #[test]
    fn test_record_decrements_pending() {
        let state = state();
        assert_eq!(state.pending(), 3);

        assert!(state.record("a", vec![fixtures::record("a", "one", 5)]));
        assert_eq!(state.pending(), 2);

        assert!(state.record("c", vec![]));
        assert_eq!(state.pending(), 1);
    }

    #[test]
    fn test_record_twice_is_ignored() {
        let state = state();
        assert!(state.record("a", vec![fixtures::record("a", "one", 5)]));
        assert!(!state.record("a", vec![fixtures::record("a", "two", 5)]));
        assert_eq!(state.pending(), 2);

        let (records, _) = state.close();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_unknown_source_is_ignored() {
        let state = state();
        assert!(!state.record("zzz", vec![]));
        assert_eq!(state.pending(), 3);
    }

    #[test]
    fn test_close_discards_late_results() {
        let state = state();
        state.record("a", vec![fixtures::record("a", "one", 5)]);

        let (records, missing) = state.close();
        assert_eq!(records.len(), 1);
        assert_eq!(missing, vec!["Beta".to_string(), "Gamma".to_string()]);

        assert!(!state.record("b", vec![fixtures::record("b", "late", 9)]));
        assert_eq!(state.pending_ids(), vec!["b".to_string(), "c".to_string()]);
        let (records, _) = state.close();
        assert!(records.is_empty());
    }

    #[test]
    fn test_snapshot_lists_pending_names() {
        let state = state();
        state.record("b", vec![]);
        let snapshot = state.snapshot(&Deadline::new(Duration::from_secs(5)));
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.pending, 2);
        assert_eq!(snapshot.pending_sources, vec!["Alpha", "Gamma"]);
    }
}
