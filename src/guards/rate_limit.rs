//! Fixed-window request quota per client identifier.
//!
//! Window state lives behind [`RateLimitStore`] so a shared external counter
//! can replace the in-process map when several instances serve the same
//! clients.  Time comes from [`Clock`] so tests can move it by hand.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use super::{Guard, Rejection, RejectionKind};
use crate::util::RequestMeta;

/// Counter state for one client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowRecord {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<WindowRecord>;
    async fn set(&self, key: &str, record: WindowRecord);
}

/// Process-local store.  Entries are never evicted; an expired record is
/// simply overwritten on the client's next request.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: DashMap<String, WindowRecord>,
}

impl MemoryRateLimitStore {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait::async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn get(&self, key: &str) -> Option<WindowRecord> {
        self.windows.get(key).map(|r| *r)
    }

    async fn set(&self, key: &str, record: WindowRecord) {
        self.windows.insert(key.to_string(), record);
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Longer configured windows are clamped to one year.
const MAX_WINDOW_SECS: i64 = 365 * 24 * 60 * 60;

pub struct RateLimitGuard {
    max: u32,
    window: Duration,
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimitGuard {
    pub fn new(
        max: u32,
        window_secs: u64,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let secs = i64::try_from(window_secs).unwrap_or(i64::MAX).min(MAX_WINDOW_SECS);
        let window = Duration::seconds(secs);
        Self {
            max,
            window,
            store,
            clock,
        }
    }

    /// Count one request against `key` and return the updated window.  A
    /// missing or expired window starts fresh at 1; otherwise the count
    /// increments and the reset time is kept.  The read and write are not
    /// atomic, so concurrent requests from one client may undercount.
    pub async fn register(&self, key: &str) -> WindowRecord {
        let now = self.clock.now();
        let record = match self.store.get(key).await {
            Some(prev) if now <= prev.reset_at => WindowRecord {
                count: prev.count.saturating_add(1),
                reset_at: prev.reset_at,
            },
            _ => WindowRecord {
                count: 1,
                reset_at: now
                    .checked_add_signed(self.window)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        };
        self.store.set(key, record).await;
        record
    }
}

#[async_trait::async_trait]
impl Guard for RateLimitGuard {
    fn name(&self) -> &str {
        "rate_limit"
    }

    async fn check(&self, meta: &RequestMeta) -> Option<Rejection> {
        let record = self.register(&meta.client_id).await;
        if record.count > self.max {
            tracing::debug!(
                client = %meta.client_id,
                count = record.count,
                reset_at = %record.reset_at,
                "rate limit exceeded"
            );
            return Some(Rejection {
                kind: RejectionKind::QuotaExceeded,
                guard: "rate_limit".into(),
                reason: "Too many requests, please retry later".into(),
            });
        }
        None
    }
}
