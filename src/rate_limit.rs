//! Per-client request limiter.
//!
//! Each client key owns a counter and the timestamp of the first request in
//! its current window. Once that timestamp falls out of the window the next
//! request starts a fresh window with a count of one. This is a fixed window
//! anchored on the first request after expiry, not a sliding log: a client
//! can land up to twice the limit across a window boundary.
//!
//! The default store lives in process memory and is only correct for a single
//! instance. Multi-instance deployments need a shared [`RateLimitStore`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    /// Epoch milliseconds of the request that opened the window.
    pub timestamp: i64,
}

/// Source of "now" for the limiter, in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Transition applied to one key: receives the stored entry (if any) and
/// returns the entry to store plus whether the request is admitted.
pub type UpdateStep<'a> =
    &'a (dyn Fn(Option<RateLimitEntry>) -> (RateLimitEntry, bool) + Send + Sync);

/// Storage behind the limiter.
///
/// `update` must apply `step` atomically for a key. The provided default is a
/// plain get-then-set and is only suitable for stores that are never shared
/// between concurrent callers; shared stores should override it.
#[async_trait::async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<RateLimitEntry>;
    async fn set(&self, key: &str, entry: RateLimitEntry);
    /// Drop every entry whose timestamp predates `window_start`. Returns the
    /// number of entries removed.
    async fn sweep(&self, window_start: i64) -> usize;

    async fn update(&self, key: &str, step: UpdateStep<'_>) -> (RateLimitEntry, bool) {
        let (entry, allowed) = step(self.get(key).await);
        self.set(key, entry).await;
        (entry, allowed)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: DashMap<String, RateLimitEntry, RandomState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl RateLimitStore for InMemoryStore {
    async fn get(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|e| *e)
    }

    async fn set(&self, key: &str, entry: RateLimitEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    async fn sweep(&self, window_start: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.timestamp >= window_start);
        before.saturating_sub(self.entries.len())
    }

    async fn update(&self, key: &str, step: UpdateStep<'_>) -> (RateLimitEntry, bool) {
        // The shard write lock is held for the whole step.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let (entry, allowed) = step(Some(*occupied.get()));
                occupied.insert(entry);
                (entry, allowed)
            }
            Entry::Vacant(vacant) => {
                let (entry, allowed) = step(None);
                vacant.insert(entry);
                (entry, allowed)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { count: u32 },
    Denied,
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Limiter front-end: owns the policy, delegates storage and time.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    max_requests: u32,
    window_ms: i64,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        max_requests: u32,
        window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            max_requests,
            window_ms: window.as_millis() as i64,
        }
    }

    /// In-memory store and wall clock.
    pub fn in_memory(max_requests: u32, window: Duration) -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(SystemClock),
            max_requests,
            window,
        )
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count one request for `key` and decide whether it may proceed.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now_ms();
        let window_start = now - self.window_ms;

        let swept = self.store.sweep(window_start).await;
        if swept > 0 {
            tracing::trace!(swept, "evicted stale rate limit entries");
        }

        let max = self.max_requests;
        let step =
            move |existing: Option<RateLimitEntry>| next_entry(existing, now, window_start, max);
        match self.store.update(key, &step).await {
            (entry, true) => RateLimitDecision::Allowed { count: entry.count },
            (_, false) => RateLimitDecision::Denied,
        }
    }
}

fn next_entry(
    existing: Option<RateLimitEntry>,
    now: i64,
    window_start: i64,
    max: u32,
) -> (RateLimitEntry, bool) {
    let fresh = RateLimitEntry {
        count: 1,
        timestamp: now,
    };
    match existing {
        None => (fresh, true),
        Some(entry) if entry.timestamp < window_start => (fresh, true),
        Some(entry) if entry.count >= max => (entry, false),
        Some(entry) => (
            RateLimitEntry {
                count: entry.count + 1,
                ..entry
            },
            true,
        ),
    }
}
