// Token cache: shared key-value storage for session tokens

use crate::config::Credentials;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

// Cache trait implemented by whatever store the application shares between clients.
// Entries have no TTL; eviction is the store's own business.
#[async_trait]
pub trait TokenCache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: String);
}

// Stable key for the token of one account/property pair
pub fn token_cache_key(credentials: &Credentials) -> String {
    format!(
        "wubook:token:{}:{}",
        credentials.lcode(),
        credentials.username()
    )
}

#[derive(Debug, Default)]
struct CacheStats {
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
    write_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatsReport {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub write_count: usize,
}

// In-process token cache backed by a `DashMap`; share it with `Arc`.
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    entries: DashMap<String, String>,
    stats: CacheStats,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            items_count: self.entries.len(),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            write_count: self.stats.write_count.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn get(&self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(entry) => {
                self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
                Some(entry.value().clone())
            }
            None => {
                self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
        self.stats.write_count.fetch_add(1, Ordering::SeqCst);
    }
}
