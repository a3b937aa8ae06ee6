//! Public Key Caching
//!
//! Caches resolved key material to reduce remote requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::async_trait;
use tokio::sync::RwLock;

use super::keys::{KeyResolver, SignatureMaterial};
use crate::error::AppError;
use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};

const CACHE_NAME: &str = "public_keys";

/// Default cap on cached keys.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Cached key entry
#[derive(Debug, Clone)]
struct CachedKey {
    material: SignatureMaterial,
    /// When this entry was cached
    cached_at: Instant,
    ttl: Duration,
}

impl CachedKey {
    /// Check if this cache entry is still valid
    fn is_valid(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }
}

/// Key resolver with a TTL cache in front of another resolver.
///
/// Failed resolutions are not cached. Key ids come from request headers, so
/// the map is capped: a full cache drops expired entries first and then the
/// oldest one.
pub struct CachingKeyResolver {
    /// key_id -> cached key
    cache: Arc<RwLock<HashMap<String, CachedKey>>>,
    inner: Arc<dyn KeyResolver>,
    default_ttl: Duration,
    max_entries: usize,
}

impl CachingKeyResolver {
    /// Create new caching resolver
    ///
    /// # Arguments
    /// * `inner` - Resolver consulted on a miss
    /// * `default_ttl` - TTL for cached keys (default: 1 hour)
    pub fn new(inner: Arc<dyn KeyResolver>, default_ttl: Option<Duration>) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            inner,
            default_ttl: default_ttl.unwrap_or(Duration::from_secs(3600)),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    /// Override the entry cap (at least one entry is always kept).
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let cache = self.cache.read().await;
        let total = cache.len();
        let valid = cache.values().filter(|v| v.is_valid()).count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }

    fn prune_expired_locked(cache: &mut HashMap<String, CachedKey>) -> usize {
        let before = cache.len();
        cache.retain(|_, v| v.is_valid());
        before - cache.len()
    }

    fn evict_oldest_locked(cache: &mut HashMap<String, CachedKey>) -> bool {
        let Some(oldest_key) = cache
            .iter()
            .min_by_key(|(_, v)| v.cached_at)
            .map(|(key, _)| key.clone())
        else {
            return false;
        };
        cache.remove(&oldest_key);
        true
    }
}

#[async_trait]
impl KeyResolver for CachingKeyResolver {
    async fn resolve(&self, key_id: &str) -> Result<SignatureMaterial, AppError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(key_id) {
                if cached.is_valid() {
                    CACHE_HITS_TOTAL.with_label_values(&[CACHE_NAME]).inc();
                    tracing::debug!(key_id, "Public key cache hit");
                    return Ok(cached.material.clone());
                }
                tracing::debug!(key_id, "Public key cache expired");
            }
        }

        CACHE_MISSES_TOTAL.with_label_values(&[CACHE_NAME]).inc();
        let material = self.inner.resolve(key_id).await?;

        {
            let mut cache = self.cache.write().await;
            if !cache.contains_key(key_id) && cache.len() >= self.max_entries {
                let removed = Self::prune_expired_locked(&mut cache);
                if removed > 0 {
                    tracing::debug!(removed, "Pruned expired public key cache entries");
                }
                if cache.len() >= self.max_entries {
                    let _ = Self::evict_oldest_locked(&mut cache);
                }
            }
            cache.insert(
                key_id.to_string(),
                CachedKey {
                    material: material.clone(),
                    cached_at: Instant::now(),
                    ttl: self.default_ttl,
                },
            );
        }

        Ok(material)
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}
