//! Per-key request record for fixed-window counting.

use std::time::Duration;
use tokio::time::Instant;

/// Counter state for a single key.
///
/// A record belongs to exactly one window. Once `now - window_start`
/// exceeds the window length it is stale and gets replaced by a fresh
/// record rather than being reset in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRecord {
    /// When the current window started
    window_start: Instant,
    /// Admitted requests since `window_start`
    count: u32,
}

impl RequestRecord {
    /// Open a new window at `now` with the first request already admitted.
    pub fn start(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 1,
        }
    }

    /// When this record's window started.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Number of admitted requests in this window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Whether the window has lapsed.
    ///
    /// The boundary is exclusive: at exactly `window` elapsed the record is
    /// still live.
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) > window
    }

    /// Admit one more request if the quota allows it.
    ///
    /// Returns `false` without touching the count when the quota is spent.
    pub fn try_admit(&mut self, max_requests: u32) -> bool {
        if self.count >= max_requests {
            return false;
        }
        self.count += 1;
        true
    }

    /// Remaining quota in this window.
    pub fn remaining(&self, max_requests: u32) -> u32 {
        max_requests.saturating_sub(self.count)
    }

    /// Time left until this window lapses.
    pub fn duration_until_reset(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.window_start))
    }
}
