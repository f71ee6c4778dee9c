//! Per-wallet request rate limiting
//!
//! Fixed 60-second windows keyed by lowercase wallet address. A window starts
//! on the first request and restarts lazily on the first request after it
//! expires.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::AuthError;

/// Length of one rate window
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Default soft capacity before expired counters are pruned
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Request count for one identity within the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitCounter {
    pub count: u32,
    pub window_reset_at: Instant,
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u32,
    /// Time until the current window resets
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Whole seconds until reset, rounded up
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// In-memory rate limiter shared by all requests of one gateway
pub struct RateLimiter {
    window: Duration,
    max_entries: usize,
    counters: Mutex<HashMap<String, RateLimitCounter>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    /// Create a limiter that prunes expired counters once `max_entries` is exceeded
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            window: RATE_WINDOW,
            max_entries,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request against `identity_key`
    pub fn check_and_consume(
        &self,
        identity_key: &str,
        limit_per_window: u32,
    ) -> Result<RateLimitDecision, AuthError> {
        self.check_and_consume_at(identity_key, limit_per_window, Instant::now())
    }

    /// Count a request against `identity_key` as of `now`
    pub fn check_and_consume_at(
        &self,
        identity_key: &str,
        limit_per_window: u32,
        now: Instant,
    ) -> Result<RateLimitDecision, AuthError> {
        let key = super::normalize_wallet(identity_key);
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| AuthError::Internal("rate limiter lock poisoned".to_string()))?;

        if counters.len() >= self.max_entries && !counters.contains_key(&key) {
            counters.retain(|_, c| now < c.window_reset_at);
        }

        let counter = counters.entry(key).or_insert(RateLimitCounter {
            count: 0,
            window_reset_at: now + self.window,
        });

        // Restart the window lazily
        if now >= counter.window_reset_at {
            *counter = RateLimitCounter {
                count: 0,
                window_reset_at: now + self.window,
            };
        }

        let reset_after = counter.window_reset_at.saturating_duration_since(now);

        if counter.count >= limit_per_window {
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_after,
            });
        }

        counter.count += 1;

        Ok(RateLimitDecision {
            allowed: true,
            remaining: limit_per_window - counter.count,
            reset_after,
        })
    }

    /// Requests left for `identity_key` without consuming one
    pub fn remaining(&self, identity_key: &str, limit_per_window: u32) -> u32 {
        let key = super::normalize_wallet(identity_key);
        let Ok(counters) = self.counters.lock() else {
            return 0;
        };
        let now = Instant::now();

        match counters.get(&key) {
            Some(c) if now < c.window_reset_at => limit_per_window.saturating_sub(c.count),
            _ => limit_per_window,
        }
    }

    /// Number of tracked identities
    pub fn tracked(&self) -> usize {
        self.counters.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
