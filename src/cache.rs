//! Time-bounded cache for the last successful vault fetch.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
pub struct SnapshotCache<T> {
    ttl: Duration,
    slot: Mutex<Option<CachedEntry<T>>>,
}

#[derive(Debug)]
struct CachedEntry<T> {
    stored_at: Instant,
    value: T,
}

impl<T: Clone> SnapshotCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get_or_refresh(&self, refresh: impl FnOnce() -> T) -> T {
        self.get_or_refresh_if(refresh, |_| true)
    }

    pub fn get_or_refresh_if(
        &self,
        refresh: impl FnOnce() -> T,
        cacheable: impl FnOnce(&T) -> bool,
    ) -> T {
        self.get_or_refresh_at(Instant::now(), refresh, cacheable)
    }

    pub fn get_or_refresh_at(
        &self,
        now: Instant,
        refresh: impl FnOnce() -> T,
        cacheable: impl FnOnce(&T) -> bool,
    ) -> T {
        // Held across `refresh` so concurrent callers wait for one fetch.
        let mut slot = self
            .slot
            .lock()
            .expect("snapshot cache lock should not be poisoned");

        if let Some(entry) = slot.as_ref() {
            let age = now.saturating_duration_since(entry.stored_at);
            if age < self.ttl {
                debug!(
                    component = "cache",
                    event = "cache.hit",
                    age_ms = age.as_millis() as u64
                );
                return entry.value.clone();
            }
        }

        let value = refresh();
        if cacheable(&value) {
            *slot = Some(CachedEntry {
                stored_at: now,
                value: value.clone(),
            });
        } else {
            *slot = None;
        }
        value
    }

    pub fn clear(&self) {
        let mut slot = self
            .slot
            .lock()
            .expect("snapshot cache lock should not be poisoned");
        let had_entry = slot.take().is_some();
        info!(component = "cache", event = "cache.clear", had_entry);
    }

    pub fn is_fresh_at(&self, now: Instant) -> bool {
        self.slot
            .lock()
            .expect("snapshot cache lock should not be poisoned")
            .as_ref()
            .map(|entry| now.saturating_duration_since(entry.stored_at) < self.ttl)
            .unwrap_or(false)
    }
}

impl<T: Clone> Default for SnapshotCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
