//! Wall-clock budget shared by the coordinator and its workers.

use std::time::Duration;

use tokio::time::Instant;

/// Margin kept between our own timeout and a host-imposed ceiling.
pub const HOST_SAFETY_MARGIN: Duration = Duration::from_secs(3);

/// Deadline of one search.
///
/// Advisory to workers (checked before each new network call) and
/// authoritative to the coordinator (it stops waiting once expired).
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start a deadline now.
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.budget
    }

    /// Whether a new network request may start, keeping `margin` in reserve.
    pub fn allows_request(&self, margin: Duration) -> bool {
        self.elapsed() + margin < self.budget
    }
}

/// Compute the effective search timeout.
///
/// With `auto` set the host ceiling minus [`HOST_SAFETY_MARGIN`] is used
/// outright; otherwise the configured timeout is clamped below it. Without a
/// host ceiling the configured timeout is returned unchanged.
pub fn effective_timeout(configured: Duration, host: Option<Duration>, auto: bool) -> Duration {
    let Some(host) = host.filter(|h| !h.is_zero()) else {
        return configured;
    };
    let ceiling = host.saturating_sub(HOST_SAFETY_MARGIN);

    if auto || configured > ceiling {
        ceiling
    } else {
        configured
    }
}
