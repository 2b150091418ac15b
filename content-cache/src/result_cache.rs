use crate::store::CacheStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use trendlens_core::{CacheError, ContentItem, CoreError, ErrorExt};

/// Memoizes crawl results by exact query signature.
///
/// A miss, an expired entry and an unavailable store all read as `None`.
/// A cached empty result reads as `Some(vec![])`.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<ContentItem>> {
        let payload = match self.store.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("Cache miss for {}", key);
                return None;
            }
            Err(e) => {
                e.log_warn();
                return None;
            }
        };

        match serde_json::from_str::<Vec<ContentItem>>(&payload) {
            Ok(items) => {
                debug!("Cache hit for {} ({} items)", key, items.len());
                Some(items)
            }
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                CacheError::CorruptEntry {
                    key: key.to_string(),
                }
                .log_warn();
                self.invalidate(key).await;
                None
            }
        }
    }

    /// Stores `items` under `key`, replacing any previous entry. Uses the
    /// default TTL when `ttl` is `None`.
    pub async fn put(&self, key: &str, items: &[ContentItem], ttl: Option<Duration>) {
        let payload = match serde_json::to_string(items) {
            Ok(payload) => payload,
            Err(e) => {
                CoreError::Serialization(e).log_warn();
                return;
            }
        };

        let ttl = ttl.unwrap_or(self.default_ttl);
        if let Err(e) = self.store.set(key, payload, ttl).await {
            e.log_warn();
        } else {
            debug!("Cached {} items under {} for {:?}", items.len(), key, ttl);
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            e.log_warn();
        }
    }

    pub async fn flush_all(&self) {
        if let Err(e) = self.store.flush_all().await {
            e.log_warn();
        }
    }
}
