//! In-process embedding cache.
//!
//! Embeddings are deterministic per (model, text), and the same observation
//! text recurs constantly in a running simulation, so an LRU in front of the
//! embedder removes a large share of the HTTP traffic. Only successful
//! results are cached; failures always retry upstream.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use reverie_core::provider::{Embedder, ProviderError};
use reverie_core::types::Embedding;

/// An LRU text→vector cache wrapping any [`Embedder`].
pub struct EmbeddingCache<E> {
    inner: E,
    cache: Mutex<LruCache<String, Embedding>>,
}

impl<E: Embedder> EmbeddingCache<E> {
    /// Wrap `inner` with a cache holding up to `capacity` entries.
    /// A zero capacity is bumped to one.
    #[must_use]
    pub fn new(inner: E, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached embeddings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl<E: Embedder> Embedder for EmbeddingCache<E> {
    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        if let Some(hit) = self.cache.lock().get(text).cloned() {
            debug!(text_len = text.len(), "Embedding cache hit");
            return Ok(hit);
        }

        let embedding = self.inner.embed(text).await?;
        self.cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts upstream calls so tests can observe cache hits.
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Embedding(vec![text.len() as f32, 1.0]))
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn repeat_queries_hit_the_cache() {
        let cache = EmbeddingCache::new(
            CountingEmbedder {
                calls: AtomicUsize::new(0),
            },
            8,
        );

        let first = cache.embed("hello").await.expect("embed");
        let second = cache.embed("hello").await.expect("embed");
        assert_eq!(first, second);
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 1);

        cache.embed("other").await.expect("embed");
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = EmbeddingCache::new(
            CountingEmbedder {
                calls: AtomicUsize::new(0),
            },
            2,
        );

        cache.embed("a").await.expect("embed");
        cache.embed("b").await.expect("embed");
        cache.embed("c").await.expect("embed"); // evicts "a"
        cache.embed("a").await.expect("embed"); // misses again

        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn dimensions_delegate_to_inner() {
        let cache = EmbeddingCache::new(
            CountingEmbedder {
                calls: AtomicUsize::new(0),
            },
            4,
        );
        assert_eq!(cache.dimensions(), 2);
    }
}
