//! In-process chart cache.

use moka::sync::Cache;
use std::time::Duration;
use tracing::debug;

use crate::{ChartPoint, UserId};

/// Cache of persisted chart points keyed by user. A miss is `None`.
pub trait ChartCache: Send + Sync {
    fn get(&self, user_id: UserId) -> Option<Vec<ChartPoint>>;
    fn put(&self, user_id: UserId, points: Vec<ChartPoint>);
    fn invalidate(&self, user_id: UserId);
    fn clear(&self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Size-bounded cache backed by `moka`. Entries older than the TTL are
/// treated as misses. A capacity of zero disables caching.
pub struct InMemoryChartCache {
    inner: Cache<UserId, Vec<ChartPoint>>,
    enabled: bool,
}

impl InMemoryChartCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(capacity as u64);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        debug!(capacity, ttl = ?ttl, "chart cache initialized");
        InMemoryChartCache {
            inner: builder.build(),
            enabled: capacity > 0,
        }
    }
}

impl Default for InMemoryChartCache {
    fn default() -> Self {
        InMemoryChartCache::new(1024, None)
    }
}

impl ChartCache for InMemoryChartCache {
    fn get(&self, user_id: UserId) -> Option<Vec<ChartPoint>> {
        self.inner.get(&user_id)
    }

    fn put(&self, user_id: UserId, points: Vec<ChartPoint>) {
        if self.enabled {
            self.inner.insert(user_id, points);
        }
    }

    fn invalidate(&self, user_id: UserId) {
        self.inner.invalidate(&user_id);
    }

    fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    fn len(&self) -> usize {
        self.inner.run_pending_tasks();
        self.inner.entry_count() as usize
    }
}
