//! In-memory query cache with hit/miss counters.

use async_trait::async_trait;
use canopic::call::{QueryCache, RequestKey};
use canopic::error::CallFailure;
use futures::future::LocalBoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

///
/// MemoryCache
///
/// The simplest [`QueryCache`]: a hash map that never expires anything.
/// Counters record how many lookups were served from the map and how many
/// had to fetch.
///

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<RequestKey, Value>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("memory cache lock").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait(?Send)]
impl QueryCache for MemoryCache {
    async fn get_or_fetch(
        &self,
        key: RequestKey,
        fetch: LocalBoxFuture<'_, Result<Value, CallFailure>>,
    ) -> Result<Value, CallFailure> {
        // Guard dropped before the fetch future is polled.
        let cached = self
            .entries
            .lock()
            .expect("memory cache lock")
            .get(&key)
            .cloned();
        if let Some(found) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = fetch.await?;
        self.entries
            .lock()
            .expect("memory cache lock")
            .insert(key, value.clone());

        Ok(value)
    }

    async fn get(&self, key: &RequestKey) -> Option<Value> {
        self.entries
            .lock()
            .expect("memory cache lock")
            .get(key)
            .cloned()
    }

    async fn invalidate(&self, pattern: &RequestKey) -> usize {
        let mut entries = self.entries.lock().expect("memory cache lock");
        let before = entries.len();
        entries.retain(|key, _| !pattern.covers(key));

        before - entries.len()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Fake;
    use futures::executor::block_on;
    use serde_json::json;

    fn key(method: &str, arg: u32) -> RequestKey {
        RequestKey::call(&Fake::principal(1), method, &[json!(arg)])
    }

    #[test]
    fn fetch_runs_once_per_key() {
        let cache = MemoryCache::new();

        let first = block_on(cache.get_or_fetch(key("get", 1), Box::pin(async { Ok(json!(7)) })))
            .expect("fetches");
        let second = block_on(cache.get_or_fetch(
            key("get", 1),
            Box::pin(async { panic!("served from cache") }),
        ))
        .expect("cached");

        assert_eq!(first, json!(7));
        assert_eq!(second, json!(7));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn failed_fetches_are_not_remembered() {
        let cache = MemoryCache::new();

        let err = block_on(cache.get_or_fetch(
            key("get", 1),
            Box::pin(async {
                Err(canopic::error::ValidationError::new("get", vec![]).into())
            }),
        ));

        assert!(err.is_err());
        assert!(cache.is_empty());
        assert_eq!(block_on(cache.get(&key("get", 1))), None);
    }

    #[test]
    fn invalidation_follows_key_patterns() {
        let cache = MemoryCache::new();
        for arg in 0..3 {
            block_on(cache.get_or_fetch(
                key("get", arg),
                Box::pin(async move { Ok(json!(arg)) }),
            ))
            .expect("fetches");
        }
        block_on(cache.get_or_fetch(key("other", 0), Box::pin(async { Ok(json!(0)) })))
            .expect("fetches");

        let removed = block_on(cache.invalidate(&RequestKey::method(&Fake::principal(1), "get")));
        assert_eq!(removed, 3);
        assert_eq!(cache.len(), 1);

        let removed = block_on(cache.invalidate(&RequestKey::canister(&Fake::principal(1))));
        assert_eq!(removed, 1);
        assert!(cache.is_empty());
    }
}
