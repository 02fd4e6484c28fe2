//! Concurrent multi-source search.
//!
//! A [`SearchCoordinator`] fans a [`SearchRequest`] out to one
//! [`SourceWorker`] per enabled source, gathers their results in a shared
//! [`SearchState`] until every source reported or the [`Deadline`] passed,
//! and runs the filter's global pass over what was collected.

mod coordinator;
mod deadline;
mod dedup;
mod normalize;
mod progress;
mod state;
mod types;
mod worker;

pub use coordinator::SearchCoordinator;
pub use deadline::{effective_timeout, Deadline, HOST_SAFETY_MARGIN};
pub use dedup::merge_results;
pub use normalize::{parse_count, parse_size};
pub use progress::{NoopProgress, ProgressReporter, ProgressSnapshot, TracingProgress};
pub use state::SearchState;
pub use types::*;
pub use worker::{cutoff, SourceWorker, WorkerSettings};
