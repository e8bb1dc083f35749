/*!
 * Wait Map
 *
 * Keyed correlation map for asynchronously arriving replies. Producers `set`
 * a value under a key; any number of consumers may `wait` on the same key,
 * before or after it is set, with or without a deadline.
 *
 * # Capacity
 *
 * Values are held in an LRU cache. With a non-zero limit the least recently
 * inserted keys are evicted once the limit is exceeded, which bounds memory
 * held for late or duplicate replies in long-lived processes.
 */

use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Inner<K: Hash + Eq, V> {
    values: LruCache<K, V>,
    waiters: HashMap<K, Vec<oneshot::Sender<V>>>,
}

/// Keyed wait map with broadcast-on-set semantics
pub struct WaitMap<K: Hash + Eq, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
}

impl<K: Hash + Eq, V> Clone for WaitMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

enum Subscription<V> {
    Ready(V),
    Pending(oneshot::Receiver<V>),
}

impl<K, V> WaitMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a wait map retaining at most `limit` values (0 = unbounded)
    pub fn new(limit: usize) -> Self {
        let values = match NonZeroUsize::new(limit) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };

        Self {
            inner: Arc::new(Mutex::new(Inner {
                values,
                waiters: HashMap::new(),
            })),
        }
    }

    /// Store a value and wake every waiter currently blocked on the key
    ///
    /// Setting an existing key overwrites it. Waiters already served keep
    /// the value they received.
    pub fn set(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        if let Some(waiters) = inner.waiters.remove(&key) {
            for tx in waiters {
                let _ = tx.send(value.clone());
            }
        }
        inner.values.put(key, value);
    }

    /// Non-blocking lookup
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().values.peek(key).cloned()
    }

    /// Block until the key is set
    pub async fn wait(&self, key: &K) -> V {
        loop {
            match self.subscribe(key) {
                Subscription::Ready(value) => return value,
                Subscription::Pending(rx) => {
                    if let Ok(value) = rx.await {
                        return value;
                    }
                }
            }
        }
    }

    /// Block until the key is set or `timeout` elapses
    pub async fn wait_for(&self, key: &K, timeout: Duration) -> Option<V> {
        let result = tokio::time::timeout(timeout, self.wait(key)).await.ok();
        if result.is_none() {
            self.prune(key);
        }
        result
    }

    /// Block until the key is set, the deadline passes or `cancel` fires
    pub async fn wait_until(
        &self,
        key: &K,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Option<V> {
        let result = tokio::select! {
            value = tokio::time::timeout_at(deadline, self.wait(key)) => value.ok(),
            _ = cancel.cancelled() => None,
        };
        if result.is_none() {
            self.prune(key);
        }
        result
    }

    /// Number of callers currently blocked on the key
    pub fn waiter_count(&self, key: &K) -> usize {
        self.inner
            .lock()
            .waiters
            .get(key)
            .map(|waiters| waiters.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn subscribe(&self, key: &K) -> Subscription<V> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.values.peek(key) {
            return Subscription::Ready(value.clone());
        }

        let (tx, rx) = oneshot::channel();
        inner.waiters.entry(key.clone()).or_default().push(tx);
        Subscription::Pending(rx)
    }

    // Drop senders whose receiver went away on timeout or cancellation
    fn prune(&self, key: &K) {
        let mut inner = self.inner.lock();
        let empty = match inner.waiters.get_mut(key) {
            Some(waiters) => {
                waiters.retain(|tx| !tx.is_closed());
                waiters.is_empty()
            }
            None => false,
        };
        if empty {
            inner.waiters.remove(key);
        }
    }
}

/// Deadline `timeout` from now, saturating at a far-future horizon
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + crate::core::limits::FAR_FUTURE)
}
