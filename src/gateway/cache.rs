//! TTL + LRU cache with request-coalescing ("stampede prevention"):
//! concurrent misses for the same key share one upstream call instead of
//! each firing its own.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

enum Slot<V, E> {
    Ready(Entry<V>),
    /// A fetch is already in flight; late arrivals subscribe for the result.
    InFlight(broadcast::Sender<Result<V, E>>),
}

pub struct TtlCache<V: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static> {
    ttl: Duration,
    max_items: usize,
    slots: Arc<Mutex<HashMap<String, Slot<V, E>>>>,
    /// Tracks insertion order for LRU-ish eviction (oldest-key-out).
    order: Arc<Mutex<Vec<String>>>,
}

impl<V: Clone + Send + Sync + 'static, E: Clone + Send + Sync + From<&'static str> + 'static> TtlCache<V, E> {
    pub fn new(ttl: Duration, max_items: usize) -> Self {
        Self {
            ttl,
            max_items,
            slots: Arc::new(Mutex::new(HashMap::new())),
            order: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns a cached, non-expired value if present, else runs `fetch` —
    /// coalescing concurrent callers for the same `key` into a single call.
    /// The real error kind (not a flattened string) is preserved end to end
    /// so callers can distinguish `Unavailable` from a retryable `Upstream`.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut rx = {
            let mut slots = self.slots.lock();
            match slots.get(key) {
                Some(Slot::Ready(entry)) if entry.inserted_at.elapsed() < self.ttl => {
                    return Ok(entry.value.clone());
                }
                Some(Slot::InFlight(tx)) => tx.subscribe(),
                _ => {
                    let (tx, rx) = broadcast::channel(1);
                    slots.insert(key.to_string(), Slot::InFlight(tx));
                    drop(slots);
                    return self.fetch_and_store(key, fetch).await;
                }
            }
        };

        rx.recv().await.unwrap_or_else(|_| Err(E::from("coalesced fetch dropped")))
    }

    async fn fetch_and_store<F, Fut>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let result = fetch().await;

        let tx = {
            let mut slots = self.slots.lock();
            match slots.remove(key) {
                Some(Slot::InFlight(tx)) => Some(tx),
                other => {
                    if let Some(s) = other {
                        slots.insert(key.to_string(), s);
                    }
                    None
                }
            }
        };

        if let Ok(value) = &result {
            self.insert(key, value.clone());
        }

        if let Some(tx) = tx {
            let _ = tx.send(result.clone());
        }

        result
    }

    fn insert(&self, key: &str, value: V) {
        let mut slots = self.slots.lock();
        let mut order = self.order.lock();

        if !slots.contains_key(key) {
            order.push(key.to_string());
        }
        slots.insert(
            key.to_string(),
            Slot::Ready(Entry {
                value,
                inserted_at: Instant::now(),
            }),
        );

        while order.len() > self.max_items {
            let oldest = order.remove(0);
            slots.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn second_call_within_ttl_hits_cache() {
        let cache: TtlCache<u32, String> = TtlCache::new(Duration::from_secs(60), 10);
        let calls = Arc::new(AtomicU32::new(0));

        let fetch = || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, String>(42)
            }
        };

        let first = cache.get_or_fetch("k", fetch).await.unwrap();
        let fetch2 = || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, String>(43)
            }
        };
        let second = cache.get_or_fetch("k", fetch2).await.unwrap();

        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn eviction_respects_max_items() {
        let cache: TtlCache<u32, String> = TtlCache::new(Duration::from_secs(60), 2);
        for i in 0..5u32 {
            cache
                .get_or_fetch(&format!("k{i}"), || async move { Ok::<u32, String>(i) })
                .await
                .unwrap();
        }
        assert_eq!(cache.slots.lock().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_into_one_fetch() {
        let cache: Arc<TtlCache<u32, String>> = Arc::new(TtlCache::new(Duration::from_secs(60), 10));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("shared", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<u32, String>(7)
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
