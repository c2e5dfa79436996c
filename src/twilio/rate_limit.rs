//! In-process rate limiter for OTP send attempts.
//!
//! Each phone number (reduced to its digits) gets a rolling window of
//! allowed attempts. Exceeding the window transitions the bucket into a
//! block state for a longer period. Entries whose window has passed are
//! treated as absent, lazily replaced on the next check and physically
//! removed by a periodic sweep.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const SHARD_COUNT: usize = 16;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Attempts allowed inside one window.
    pub max_attempts: u32,
    /// Length of the counting window in seconds.
    pub window_secs: u64,
    /// Length of the block imposed after the window is exhausted.
    pub block_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            window_secs: 60,
            block_secs: 300,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Blocked { retry_after_secs: u64 },
}

#[derive(Debug)]
struct RateLimitEntry {
    count: u32,
    reset_at: Instant,
    blocked: bool,
}

impl RateLimitEntry {
    fn expired(&self, now: Instant) -> bool {
        now > self.reset_at
    }
}

/// Sliding-window rate limiter keyed by normalized phone digits.
///
/// The map is sharded so checks for distinct identifiers do not contend;
/// the read-modify-write for one identifier happens entirely under its
/// shard lock.
pub struct RateLimiter {
    config: RateLimitConfig,
    shards: Vec<Mutex<HashMap<String, RateLimitEntry>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self { config, shards }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, RateLimitEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }

    /// Records one OTP send attempt for `key` and decides whether it may
    /// proceed.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut entries = self.shard(key).lock().await;

        if let Some(entry) = entries.get_mut(key) {
            // A logically expired entry counts as absent.
            if entry.expired(now) {
                *entry = self.fresh_entry(now);
                return RateLimitDecision::Allowed;
            }

            if entry.blocked {
                let retry_after_secs = remaining_secs(entry.reset_at, now);
                debug!(key, retry_after_secs, "attempt during block window");
                return RateLimitDecision::Blocked { retry_after_secs };
            }

            entry.count += 1;
            if entry.count > self.config.max_attempts {
                entry.blocked = true;
                entry.reset_at = now + Duration::from_secs(self.config.block_secs);
                warn!(key, "rate limit exceeded, blocking");
                return RateLimitDecision::Blocked {
                    retry_after_secs: remaining_secs(entry.reset_at, now),
                };
            }

            return RateLimitDecision::Allowed;
        }

        entries.insert(key.to_string(), self.fresh_entry(now));
        RateLimitDecision::Allowed
    }

    fn fresh_entry(&self, now: Instant) -> RateLimitEntry {
        RateLimitEntry {
            count: 1,
            reset_at: now + Duration::from_secs(self.config.window_secs),
            blocked: false,
        }
    }

    /// Removes expired entries. Expiry is re-checked under the shard lock
    /// at deletion time, so an entry refreshed by a concurrent check is
    /// never dropped.
    pub async fn sweep(&self) {
        self.sweep_at(Instant::now()).await
    }

    async fn sweep_at(&self, now: Instant) {
        let mut removed = 0usize;
        for shard in &self.shards {
            let mut entries = shard.lock().await;
            let before = entries.len();
            entries.retain(|_, entry| !entry.expired(now));
            removed += before - entries.len();
        }
        if removed > 0 {
            debug!(removed, "swept expired rate limit entries");
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().await.len();
        }
        total
    }
}

fn remaining_secs(reset_at: Instant, now: Instant) -> u64 {
    let remaining = reset_at.saturating_duration_since(now);
    // Round up so "0.4s left" still tells the caller to wait a second.
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
