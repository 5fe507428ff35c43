//! Keyed state with idle expiry.
//!
//! Limiters and breakers are created per key on first use. Keys that go
//! quiet are dropped: an entry idle for `expire_time` is evicted by the next
//! sweep, and sweeps run at most every `clean_interval`, triggered lazily by
//! access or by an optional background task.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use laneway_core::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Slot<V> {
    value: Arc<V>,
    last_access: AtomicU64,
}

impl<V> Slot<V> {
    fn new(value: Arc<V>, now: u64) -> Self {
        Self {
            value,
            last_access: AtomicU64::new(now),
        }
    }

    fn touch(&self, now: u64) {
        self.last_access.fetch_max(now, Ordering::Relaxed);
    }

    fn idle(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_access.load(Ordering::Relaxed))
    }
}

/// Concurrent map whose idle entries expire
pub struct ExpiringMap<V> {
    entries: DashMap<String, Slot<V>>,
    clock: Arc<dyn Clock>,
    clean_interval: u64,
    expire_time: u64,
    last_sweep: AtomicU64,
}

impl<V> ExpiringMap<V> {
    /// Create a map sweeping every `clean_interval` ms and evicting after `expire_time` ms idle
    #[must_use]
    pub fn new(clean_interval: u64, expire_time: u64, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            entries: DashMap::new(),
            clock,
            clean_interval,
            expire_time,
            last_sweep: AtomicU64::new(now),
        }
    }

    /// Value for a key, created with `make` when absent
    pub fn get_or_insert_with(&self, key: &str, make: impl FnOnce() -> V) -> Arc<V> {
        self.get_fresh_or_insert_with(key, |_| true, make)
    }

    /// Value for a key, replaced with `make` when absent or when `fresh` rejects it
    pub fn get_fresh_or_insert_with(
        &self,
        key: &str,
        fresh: impl Fn(&V) -> bool,
        make: impl FnOnce() -> V,
    ) -> Arc<V> {
        let now = self.clock.now_millis();
        self.maybe_sweep(now);

        if let Some(slot) = self.entries.get(key) {
            if fresh(&slot.value) {
                slot.touch(now);
                return Arc::clone(&slot.value);
            }
        }

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if fresh(&occupied.get().value) {
                    occupied.get().touch(now);
                    return Arc::clone(&occupied.get().value);
                }
                let value = Arc::new(make());
                occupied.insert(Slot::new(Arc::clone(&value), now));
                value
            }
            Entry::Vacant(vacant) => {
                let value = Arc::new(make());
                vacant.insert(Slot::new(Arc::clone(&value), now));
                value
            }
        }
    }

    /// Value for a key without creating it; counts as an access
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let now = self.clock.now_millis();
        self.maybe_sweep(now);
        self.entries.get(key).map(|slot| {
            slot.touch(now);
            Arc::clone(&slot.value)
        })
    }

    /// Whether a key is currently held, without touching it
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop a key
    pub fn remove(&self, key: &str) -> Option<Arc<V>> {
        self.entries.remove(key).map(|(_, slot)| slot.value)
    }

    /// Number of held keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict every entry idle for at least `expire_time`, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        self.last_sweep.fetch_max(now, Ordering::AcqRel);
        self.sweep_at(now)
    }

    fn maybe_sweep(&self, now: u64) {
        let last = self.last_sweep.load(Ordering::Acquire);
        if now.saturating_sub(last) < self.clean_interval {
            return;
        }
        // One caller wins the sweep for this interval.
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.sweep_at(now);
        }
    }

    fn sweep_at(&self, now: u64) -> usize {
        let before = self.entries.len();
        let expire_time = self.expire_time;
        self.entries.retain(|_, slot| slot.idle(now) < expire_time);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "swept expired keys");
        }
        evicted
    }
}

impl<V: Send + Sync + 'static> ExpiringMap<V> {
    /// Sweep on a fixed `clean_interval` timer until the map is dropped
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let map: Weak<Self> = Arc::downgrade(self);
        let period = Duration::from_millis(self.clean_interval.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(map) = map.upgrade() else {
                    break;
                };
                map.sweep();
            }
        })
    }
}
