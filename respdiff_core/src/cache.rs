use crate::normalizer::NormalizerOptions;
use lru::LruCache;
use respdiff_common::{Blake3Hash, ContentFormat, NormalizedDocument};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Identity of a normalization result.
///
/// A normalized document is a pure function of these fields, so entries never
/// need invalidating; they only age out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub content_type: String,
    pub format: ContentFormat,
    pub body_hash: Blake3Hash,
    pub options: NormalizerOptions,
}

impl CacheKey {
    pub fn new(
        content_type: &str,
        format: ContentFormat,
        body: &[u8],
        options: NormalizerOptions,
    ) -> Self {
        Self {
            content_type: content_type.to_string(),
            format,
            body_hash: Blake3Hash::of(body),
            options,
        }
    }
}

/// Bounded, least-recently-used cache of normalized documents.
///
/// Clones share the same storage.
#[derive(Clone)]
pub struct NormalizationCache {
    inner: Option<Arc<Mutex<LruCache<CacheKey, Arc<NormalizedDocument>>>>>,
    capacity: usize,
}

impl NormalizationCache {
    /// A capacity of zero yields a cache that stores nothing
    pub fn new(capacity: usize) -> Self {
        let inner = NonZeroUsize::new(capacity).map(|cap| Arc::new(Mutex::new(LruCache::new(cap))));
        Self { inner, capacity }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<NormalizedDocument>> {
        let inner = self.inner.as_ref()?;
        let hit = inner.lock().ok()?.get(key).cloned();
        if hit.is_some() {
            debug!("Normalization cache hit for {}", key.body_hash.to_hex());
        } else {
            debug!("Normalization cache miss for {}", key.body_hash.to_hex());
        }
        hit
    }

    pub fn put(&self, key: CacheKey, document: Arc<NormalizedDocument>) {
        if let Some(inner) = &self.inner {
            if let Ok(mut cache) = inner.lock() {
                if let Some((evicted, _)) = cache.push(key.clone(), document) {
                    if evicted != key {
                        debug!("Evicted {} from normalization cache", evicted.body_hash.to_hex());
                    }
                }
            }
        }
    }

    pub fn clear(&self) {
        if let Some(inner) = &self.inner {
            if let Ok(mut cache) = inner.lock() {
                cache.clear();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .as_ref()
            .and_then(|inner| inner.lock().ok().map(|cache| cache.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for NormalizationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizationCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
