//! Byte-budgeted LRU cache of materialized cells.
//!
//! Recency is tracked with a monotonically increasing access tick. A
//! `BTreeMap<tick, key>` keeps entries ordered from least to most recently
//! used, so eviction pops from the front. Every mutation of that bookkeeping
//! happens under a single `parking_lot::Mutex`. Hit/miss counters are atomics
//! and can be read without taking the lock.

use crate::cell::GeoCell;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default memory budget: 8 MiB.
pub const DEFAULT_CACHE_BUDGET_BYTES: usize = 8 * 1024 * 1024;

/// Point-in-time view of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub count: usize,
    pub current_memory_bytes: usize,
    pub budget_bytes: usize,
}

impl CacheStats {
    /// Fraction of lookups served from memory, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Slot {
    cell: Arc<GeoCell>,
    tick: u64,
}

#[derive(Debug, Default)]
struct Inner {
    slots: FxHashMap<String, Slot>,
    recency: BTreeMap<u64, String>,
    current_bytes: usize,
    next_tick: u64,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn remove(&mut self, hash: &str) -> Option<Slot> {
        let slot = self.slots.remove(hash)?;
        self.recency.remove(&slot.tick);
        self.current_bytes -= slot.cell.estimated_memory_bytes;
        Some(slot)
    }
}

/// Shared LRU cache of [`GeoCell`]s bounded by estimated memory use.
#[derive(Debug)]
pub struct CellCache {
    budget_bytes: usize,
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for CellCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_BUDGET_BYTES)
    }
}

impl CellCache {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            inner: Mutex::new(Inner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Insert or replace `hash` as the most recently used entry.
    ///
    /// Older entries are evicted until the total fits the budget. A cell that
    /// alone exceeds the budget is still admitted and ends up the only entry.
    pub fn put(&self, hash: &str, cell: Arc<GeoCell>) {
        let size = cell.estimated_memory_bytes;
        if size > self.budget_bytes {
            log::warn!(
                "Cell {} needs {} bytes, more than the whole cache budget of {}",
                hash,
                size,
                self.budget_bytes
            );
        }

        let mut inner = self.inner.lock();
        inner.remove(hash);

        let tick = inner.bump();
        inner.recency.insert(tick, hash.to_string());
        inner.slots.insert(hash.to_string(), Slot { cell, tick });
        inner.current_bytes += size;

        while inner.current_bytes > self.budget_bytes && inner.slots.len() > 1 {
            let Some((_, victim)) = inner.recency.pop_first() else {
                break;
            };
            if let Some(slot) = inner.slots.remove(&victim) {
                inner.current_bytes -= slot.cell.estimated_memory_bytes;
                self.evictions.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "Evicted cell {} ({} bytes), cache now {} / {} bytes",
                    victim,
                    slot.cell.estimated_memory_bytes,
                    inner.current_bytes,
                    self.budget_bytes
                );
            }
        }
    }

    /// Fetch `hash`, marking it most recently used.
    ///
    /// A miss leaves the recency order untouched.
    pub fn try_get(&self, hash: &str) -> Option<Arc<GeoCell>> {
        let mut inner = self.inner.lock();
        let Some(old_tick) = inner.slots.get(hash).map(|slot| slot.tick) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let tick = inner.bump();
        inner.recency.remove(&old_tick);
        inner.recency.insert(tick, hash.to_string());

        let slot = inner.slots.get_mut(hash)?;
        slot.tick = tick;
        let cell = Arc::clone(&slot.cell);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(cell)
    }

    /// Whether `hash` is resident. Does not count as an access.
    pub fn contains(&self, hash: &str) -> bool {
        self.inner.lock().slots.contains_key(hash)
    }

    pub fn remove(&self, hash: &str) -> bool {
        self.inner.lock().remove(hash).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.recency.clear();
        inner.current_bytes = 0;
    }

    pub fn count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn current_memory_bytes(&self) -> usize {
        self.inner.lock().current_bytes
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        let (count, current_memory_bytes) = {
            let inner = self.inner.lock();
            (inner.slots.len(), inner.current_bytes)
        };
        CacheStats {
            hits: self.hit_count(),
            misses: self.miss_count(),
            evictions: self.evictions.load(Ordering::Relaxed),
            count,
            current_memory_bytes,
            budget_bytes: self.budget_bytes,
        }
    }
}
