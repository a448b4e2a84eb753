//! Per-Client Rate Limiting
//!
//! Protects the compression endpoint from abuse by bounding how many
//! requests a single client may make per window.
//!
//! Uses the `governor` crate's token bucket algorithm with these
//! characteristics:
//! - Rolling window (the full quota is available as a burst; one slot
//!   replenishes every `window / quota`)
//! - Fast (lock-free atomic admission checks per limiter)
//! - Memory efficient (in-memory state with idle-entry eviction)
//!
//! The client key is the authenticated caller's key when one is resolved,
//! otherwise the remote IP address. The storage backend is pluggable
//! behind [`RateLimitBackend`]; this module provides the in-process
//! implementation used by single-instance deployments.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use parking_lot::RwLock;

/// Maximum number of per-client rate limiters to track before cleanup
const DEFAULT_MAX_CLIENT_LIMITERS: usize = 100_000;
/// Default TTL for idle rate limiters (5 minutes)
const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(5 * 60);
/// Default cleanup interval (1 minute)
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Admission contract the request handler depends on.
///
/// Single-instance deployments use [`RateLimitManager`]; multi-instance
/// deployments can substitute an implementation backed by a shared
/// external counter without touching the handler.
pub trait RateLimitBackend: Send + Sync {
    /// Returns true if the request is admitted, false if the client's
    /// quota for the current window is exhausted.
    fn allow(&self, client_key: &str) -> bool;
}

/// A rate limiter entry with last access tracking for TTL-based eviction
struct TrackedLimiter {
    limiter: Arc<RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>>,
    last_accessed: Instant,
}

/// In-process rate limiter keyed by client
pub struct RateLimitManager {
    /// Quota template shared by every client limiter (None = disabled)
    quota: Option<Quota>,
    /// Per-client limiters with access tracking
    clients: Arc<RwLock<HashMap<String, TrackedLimiter>>>,
    /// Maximum number of tracked clients before emergency cleanup
    max_client_limiters: usize,
    /// TTL for idle rate limiters before eviction
    idle_ttl: Duration,
}

impl RateLimitManager {
    /// Create a manager admitting `quota` requests per `window` per client.
    ///
    /// A zero quota disables rate limiting entirely.
    pub fn new(quota: u32, window: Duration) -> Self {
        Self {
            quota: build_quota(quota, window),
            clients: Arc::new(RwLock::new(HashMap::new())),
            max_client_limiters: DEFAULT_MAX_CLIENT_LIMITERS,
            idle_ttl: DEFAULT_IDLE_TTL,
        }
    }

    /// Check if a request from the given client should be admitted.
    ///
    /// Returns true if allowed, false if the quota is exhausted.
    ///
    /// If the number of tracked clients exceeds `max_client_limiters`, the
    /// map is cleared to prevent unbounded memory growth under flooding.
    /// Each access updates the `last_accessed` timestamp so active
    /// limiters survive TTL-based eviction.
    pub fn check_client(&self, client_key: &str) -> bool {
        let Some(quota) = self.quota else {
            return true; // No limit configured
        };

        let mut clients = self.clients.write();

        if clients.len() >= self.max_client_limiters && !clients.contains_key(client_key) {
            tracing::warn!(
                client_count = clients.len(),
                max_clients = self.max_client_limiters,
                "Per-client rate limiter count exceeded max, clearing all to prevent memory exhaustion"
            );
            clients.clear();
        }

        let entry = clients
            .entry(client_key.to_string())
            .or_insert_with(|| TrackedLimiter {
                limiter: Arc::new(RateLimiter::direct(quota)),
                last_accessed: Instant::now(),
            });

        entry.last_accessed = Instant::now();
        entry.limiter.check().is_ok()
    }

    /// Start the background task that evicts idle rate limiters.
    ///
    /// Runs every `interval` (default: 60 seconds) and removes limiter
    /// entries not accessed within the TTL period. Call once from the
    /// wiring code after the manager is created; requires a running
    /// tokio runtime.
    pub fn start_cleanup_task(&self, interval: Option<Duration>) {
        let interval = interval.unwrap_or(DEFAULT_CLEANUP_INTERVAL);
        let clients = Arc::clone(&self.clients);
        let idle_ttl = self.idle_ttl;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let now = Instant::now();

                // Two-phase: collect expired keys with the read lock, then
                // remove with the write lock to keep write-hold time short
                let expired: Vec<String> = {
                    let clients_guard = clients.read();
                    clients_guard
                        .iter()
                        .filter(|(_, entry)| now.duration_since(entry.last_accessed) >= idle_ttl)
                        .map(|(key, _)| key.clone())
                        .collect()
                };

                if !expired.is_empty() {
                    let mut clients_guard = clients.write();
                    for key in &expired {
                        clients_guard.remove(key);
                    }
                    tracing::debug!(
                        evicted_clients = expired.len(),
                        remaining_clients = clients_guard.len(),
                        "Evicted idle client rate limiters"
                    );
                }
            }
        });

        tracing::info!(
            interval_secs = interval.as_secs(),
            idle_ttl_secs = self.idle_ttl.as_secs(),
            "Started rate limiter cleanup task"
        );
    }

    /// Get count of tracked clients (for tests and monitoring)
    pub fn tracked_client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Clean up client limiters that haven't been used within the TTL
    /// period. Returns the number of entries evicted.
    pub fn cleanup_stale_clients(&self, ttl: Duration) -> usize {
        let mut clients = self.clients.write();
        let before_count = clients.len();
        let now = Instant::now();

        clients.retain(|_, entry| now.duration_since(entry.last_accessed) < ttl);

        let evicted = before_count - clients.len();
        if evicted > 0 {
            tracing::info!(
                evicted_clients = evicted,
                remaining_clients = clients.len(),
                ttl_secs = ttl.as_secs(),
                "Cleaned up stale per-client rate limiters"
            );
        }
        evicted
    }
}

impl RateLimitBackend for RateLimitManager {
    fn allow(&self, client_key: &str) -> bool {
        self.check_client(client_key)
    }
}

/// Translate a per-window quota into a governor quota: the whole quota is
/// available as a burst, and one slot replenishes every `window / quota`.
fn build_quota(quota: u32, window: Duration) -> Option<Quota> {
    let burst = NonZeroU32::new(quota)?;
    if window.is_zero() {
        return None;
    }
    Quota::with_period(window / quota).map(|q| q.allow_burst(burst))
}
