//! Core fixed-window rate limiter.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::policy::RateLimitPolicy;
use super::record::RequestRecord;
use crate::error::{LimiterError, Result};

/// Key used by the `*_default` helpers.
pub const DEFAULT_KEY: &str = "default";

/// A per-key fixed-window admission controller.
///
/// Each key gets its own counter. Stale windows are only noticed when the
/// key is touched again, so the registry grows with the number of distinct
/// keys unless a cap is set with [`RateLimiter::with_max_keys`] or
/// [`RateLimiter::purge_expired`] is called.
///
/// This struct is thread-safe and can be shared across multiple tasks.
#[derive(Debug)]
pub struct RateLimiter {
    /// Admission policy for every key in this instance
    policy: RateLimitPolicy,
    /// Request records indexed by key
    records: DashMap<String, RequestRecord>,
    /// Optional cap on tracked keys
    max_keys: Option<usize>,
}

impl RateLimiter {
    /// Create a new rate limiter with an unbounded key registry.
    pub fn new(policy: RateLimitPolicy) -> Self {
        debug!(
            max_requests = policy.max_requests,
            window_ms = policy.window.as_millis() as u64,
            retry_after_ms = policy.retry_after.as_millis() as u64,
            "Rate limiter initialized"
        );

        Self {
            policy,
            records: DashMap::new(),
            max_keys: None,
        }
    }

    /// Cap the number of tracked keys.
    ///
    /// When a new key arrives at the cap, expired records are dropped first,
    /// then the record with the oldest window start.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = Some(max_keys.max(1));
        self
    }

    /// The policy this limiter enforces.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Decide whether a request for `key` may proceed now.
    ///
    /// Admitted requests are counted; a rejected call leaves the record as
    /// it was. The read, check and increment happen under the entry lock,
    /// so concurrent callers never push a window past its quota.
    pub fn check_limit(&self, key: &str) -> bool {
        let now = Instant::now();

        if let Some(cap) = self.max_keys {
            if self.records.len() >= cap && !self.records.contains_key(key) {
                self.make_room(now, cap);
            }
        }

        match self.records.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(RequestRecord::start(now));
                trace!(key = %key, "Rate limit window opened");
                true
            }
            Entry::Occupied(mut slot) => {
                if slot.get().is_expired(now, self.policy.window) {
                    slot.insert(RequestRecord::start(now));
                    trace!(key = %key, "Rate limit window expired, reopened");
                    return true;
                }

                let record = slot.get_mut();
                if record.try_admit(self.policy.max_requests) {
                    trace!(
                        key = %key,
                        count = record.count(),
                        max = self.policy.max_requests,
                        "Rate limit check passed"
                    );
                    true
                } else {
                    debug!(
                        key = %key,
                        count = record.count(),
                        max = self.policy.max_requests,
                        "Rate limit exceeded"
                    );
                    false
                }
            }
        }
    }

    /// [`check_limit`](Self::check_limit) against [`DEFAULT_KEY`].
    pub fn check_limit_default(&self) -> bool {
        self.check_limit(DEFAULT_KEY)
    }

    /// Wait until a request for `key` is admitted.
    ///
    /// Polls every `retry_after`. Only the calling task sleeps; no lock is
    /// held in between. There is no upper bound on the wait, use
    /// [`wait_for_slot_timeout`](Self::wait_for_slot_timeout) for one.
    pub async fn wait_for_slot(&self, key: &str) {
        while !self.check_limit(key) {
            trace!(
                key = %key,
                retry_after_ms = self.policy.retry_after.as_millis() as u64,
                "Waiting for rate limit slot"
            );
            tokio::time::sleep(self.policy.retry_after).await;
        }
    }

    /// [`wait_for_slot`](Self::wait_for_slot) against [`DEFAULT_KEY`].
    pub async fn wait_for_slot_default(&self) {
        self.wait_for_slot(DEFAULT_KEY).await
    }

    /// Wait for a slot, giving up once `max_wait` has passed.
    ///
    /// The last sleep is shortened so a final check lands on the deadline.
    pub async fn wait_for_slot_timeout(&self, key: &str, max_wait: Duration) -> Result<()> {
        let started = Instant::now();

        loop {
            if self.check_limit(key) {
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= max_wait {
                debug!(key = %key, waited_ms = waited.as_millis() as u64, "Gave up waiting for rate limit slot");
                return Err(LimiterError::WaitTimeout {
                    key: key.to_string(),
                    waited,
                });
            }

            tokio::time::sleep(self.policy.retry_after.min(max_wait - waited)).await;
        }
    }

    /// Forget the record for `key`, or every record when `key` is `None`.
    ///
    /// Resetting an unknown key does nothing.
    pub fn reset(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                if self.records.remove(key).is_some() {
                    debug!(key = %key, "Rate limit record reset");
                }
            }
            None => {
                self.records.clear();
                debug!("All rate limit records reset");
            }
        }
    }

    /// Admitted count in the live window for `key`, if any.
    pub fn current_count(&self, key: &str) -> Option<u32> {
        let now = Instant::now();
        self.records
            .get(key)
            .filter(|record| !record.is_expired(now, self.policy.window))
            .map(|record| record.count())
    }

    /// Quota left in the live window for `key`.
    pub fn remaining(&self, key: &str) -> u32 {
        let now = Instant::now();
        self.records
            .get(key)
            .filter(|record| !record.is_expired(now, self.policy.window))
            .map(|record| record.remaining(self.policy.max_requests))
            .unwrap_or(self.policy.max_requests)
    }

    /// Time until the live window for `key` lapses, if there is one.
    pub fn time_until_reset(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.records
            .get(key)
            .filter(|record| !record.is_expired(now, self.policy.window))
            .map(|record| record.duration_until_reset(now, self.policy.window))
    }

    /// Number of keys currently tracked, including stale ones.
    pub fn key_count(&self) -> usize {
        self.records.len()
    }

    /// Drop every record whose window has lapsed. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let window = self.policy.window;
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now, window));
        let purged = before.saturating_sub(self.records.len());
        if purged > 0 {
            debug!(purged = purged, "Purged expired rate limit records");
        }
        purged
    }

    fn make_room(&self, now: Instant, cap: usize) {
        self.purge_expired_at(now);
        if self.records.len() < cap {
            return;
        }

        // Collect first: removing while iterating would deadlock the shard.
        let oldest = self
            .records
            .iter()
            .min_by_key(|entry| entry.value().window_start())
            .map(|entry| entry.key().clone());

        if let Some(oldest) = oldest {
            self.records.remove(&oldest);
            debug!(key = %oldest, "Evicted oldest rate limit record");
        }
    }
}
