//! Per-client token buckets.
//!
//! The registry owns one GCRA limiter (Governor's token-bucket equivalent)
//! per client key. Locking happens at two levels:
//!
//! - the map is behind an `RwLock` taken for reading on the hot path and for
//!   writing only to insert a new client or to sweep;
//! - each bucket updates its own state atomically, so clients never wait on
//!   each other's checks.
//!
//! Entries remember when they were last used; [`ClientRegistry::sweep`]
//! drops those idle for longer than the staleness window.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Error type for registry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// RPS value cannot be zero.
    ZeroRps,
    /// Burst value cannot be zero.
    ZeroBurst,
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::ZeroRps => write!(f, "RPS must be greater than 0"),
            RateLimitError::ZeroBurst => write!(f, "burst must be greater than 0"),
        }
    }
}

impl std::error::Error for RateLimitError {}

struct ClientBucket {
    limiter: DefaultDirectRateLimiter,
    /// Milliseconds since the registry epoch.
    last_seen_ms: AtomicU64,
}

/// Lifecycle-scoped registry of client buckets.
pub struct ClientRegistry {
    quota: Quota,
    rps: u32,
    stale_after: Duration,
    epoch: Instant,
    clients: RwLock<HashMap<String, Arc<ClientBucket>>>,
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("rps", &self.rps)
            .field("stale_after", &self.stale_after)
            .field("clients", &self.len())
            .finish()
    }
}

impl ClientRegistry {
    /// Buckets hold `burst` tokens and refill at `rps` per second.
    ///
    /// # Errors
    ///
    /// Returns an error when `rps` or `burst` is zero.
    pub fn new(rps: u32, burst: u32, stale_after: Duration) -> Result<Self, RateLimitError> {
        let rps_nonzero = NonZeroU32::new(rps).ok_or(RateLimitError::ZeroRps)?;
        let burst_nonzero = NonZeroU32::new(burst).ok_or(RateLimitError::ZeroBurst)?;

        Ok(Self {
            quota: Quota::per_second(rps_nonzero).allow_burst(burst_nonzero),
            rps,
            stale_after,
            epoch: Instant::now(),
            clients: RwLock::new(HashMap::new()),
        })
    }

    /// Configured refill rate, reported in `X-RateLimit-Limit`.
    pub fn limit(&self) -> u32 {
        self.rps
    }

    /// Take one token from `key`'s bucket.
    ///
    /// Returns how long to wait when the bucket is empty; a rejected check
    /// consumes nothing.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let bucket = self.bucket(key);
        bucket
            .last_seen_ms
            .store(self.now_ms(), Ordering::Relaxed);

        bucket
            .limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }

    /// Evict clients idle for longer than the staleness window.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = self.now_ms();
        let stale_ms = u64::try_from(self.stale_after.as_millis()).unwrap_or(u64::MAX);

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|_, bucket| {
            now.saturating_sub(bucket.last_seen_ms.load(Ordering::Relaxed)) <= stale_ms
        });
        before - clients.len()
    }

    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket(&self, key: &str) -> Arc<ClientBucket> {
        if let Some(bucket) = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(bucket);
        }

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(clients.entry(key.to_string()).or_insert_with(|| {
            Arc::new(ClientBucket {
                limiter: RateLimiter::direct(self.quota),
                last_seen_ms: AtomicU64::new(self.now_ms()),
            })
        }))
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
