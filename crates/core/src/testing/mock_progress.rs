//! Progress reporter that records what it observed.

use std::sync::{Mutex, PoisonError};

use crate::searcher::{ProgressReporter, ProgressSnapshot};

#[derive(Debug, Default)]
struct Observed {
    started: Option<ProgressSnapshot>,
    updates: Vec<ProgressSnapshot>,
    finished: Option<ProgressSnapshot>,
}

/// Records every snapshot handed to it.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    observed: Mutex<Observed>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started_snapshot(&self) -> Option<ProgressSnapshot> {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started
            .clone()
    }

    pub fn updates(&self) -> Vec<ProgressSnapshot> {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .updates
            .clone()
    }

    pub fn finished_snapshot(&self) -> Option<ProgressSnapshot> {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished
            .clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn started(&self, snapshot: &ProgressSnapshot) {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started = Some(snapshot.clone());
    }

    fn update(&self, snapshot: &ProgressSnapshot) {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .updates
            .push(snapshot.clone());
    }

    fn finished(&self, snapshot: &ProgressSnapshot) {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished = Some(snapshot.clone());
    }
}
