use dashmap::DashMap;
use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::debug;

/// Entrada con su instante de creación y último acceso
#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Option<Duration>,
    last_access: AtomicU64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Option<Duration>, tick: u64) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
            last_access: AtomicU64::new(tick),
        }
    }

    fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.created_at.elapsed() >= ttl)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_removals: AtomicU64,
}

/// Cache LRU con TTL sobre `DashMap`. Los clones comparten los datos.
#[derive(Debug)]
pub struct LRUCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    capacity: usize,
    default_ttl: Option<Duration>,
    clock: Arc<AtomicU64>,
    counters: Arc<Counters>,
}

impl<K, V> LRUCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            data: Arc::new(DashMap::with_capacity(capacity)),
            capacity: capacity.max(1),
            default_ttl: Some(ttl),
            clock: Arc::new(AtomicU64::new(0)),
            counters: Arc::new(Counters::default()),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.insert_with_ttl(key, value, self.default_ttl)
    }

    /// `ttl = None` mantiene la entrada hasta que sea desalojada
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Option<Duration>) -> Option<V> {
        if !self.data.contains_key(&key) {
            while self.data.len() >= self.capacity {
                if !self.evict_one() {
                    break;
                }
            }
        }

        let entry = CacheEntry::new(value, ttl, self.tick());
        self.data.insert(key, entry).map(|old| old.value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let Some(entry) = self.data.get(key) else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if entry.is_expired() {
            drop(entry);
            self.data.remove(key);
            self.counters.expired_removals.fetch_add(1, Ordering::Relaxed);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        entry.last_access.store(self.tick(), Ordering::Relaxed);
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Desaloja la entrada usada hace más tiempo
    fn evict_one(&self) -> bool {
        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                self.data.remove(&key);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            self.counters
                .expired_removals
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expired_removals: self.counters.expired_removals.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> Clone for LRUCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            capacity: self.capacity,
            default_ttl: self.default_ttl,
            clock: self.clock.clone(),
            counters: self.counters.clone(),
        }
    }
}

/// Métricas básicas del cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removals: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
