use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt};

use super::store::{KeyedStore, PendingTracker};
use super::{LoadError, LoadResult};

/// The operation that actually produces a value for a key.
///
/// The [`CoalescingCache`] treats this as a black box: it only looks at whether the returned
/// future resolved to a value or an error. Different cache variants are built by plugging in
/// different loaders, see [`PlaceholderLoader`] and
/// [`InstrumentLoader`](crate::instrument::InstrumentLoader).
pub trait ExternalLoader: Send + Sync + 'static {
    /// The loaded value. It is cloned once for the store and once for every waiter.
    type Value: Clone + Send + Sync + 'static;

    /// Loads the value for `key`.
    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, LoadResult<Self::Value>>;

    /// A name for this kind of loader, used to tag logs and metrics.
    fn name(&self) -> &'static str {
        "external"
    }
}

/// A loader that produces `external_value_for_<key>` for every key.
///
/// This is the default loader of a cache that has not been given a real one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderLoader;

impl ExternalLoader for PlaceholderLoader {
    type Value = Arc<str>;

    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, LoadResult<Self::Value>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let value: Arc<str> = format!("external_value_for_{key}").into();
            Ok(value)
        })
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}

/// A one-shot subscription to the completion of the next load of a key.
type Waiter<T> = Box<dyn FnOnce(LoadResult<T>) + Send + 'static>;

struct CacheState<T> {
    /// Successfully loaded values.
    store: KeyedStore<T>,
    /// Keys with a load in flight.
    pending: PendingTracker,
    /// Callers waiting for the in-flight load of a key, in registration order.
    waiters: KeyedStore<Vec<Waiter<T>>>,
    /// Keys that were invalidated while their load was in flight.
    stale: KeyedStore<()>,
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self {
            store: KeyedStore::new(),
            pending: PendingTracker::new(),
            waiters: KeyedStore::new(),
            stale: KeyedStore::new(),
        }
    }
}

struct Inner<L: ExternalLoader> {
    loader: L,
    state: Mutex<CacheState<L::Value>>,
}

/// An in-memory cache that loads every key at most once at a time.
///
/// All callers asking for a key while it is being loaded are queued up and receive the very
/// same result once the load completes. Successful results are kept until they are
/// [invalidated](Self::invalidate), failures are handed out but never cached, so the next
/// request retries the load.
///
/// Loads are spawned onto the current tokio runtime, so the cache needs to be used from
/// within one.
pub struct CoalescingCache<L: ExternalLoader> {
    inner: Arc<Inner<L>>,
}

impl<L: ExternalLoader> Clone for CoalescingCache<L> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: ExternalLoader> fmt::Debug for CoalescingCache<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (cached, pending) = self
            .inner
            .state
            .try_lock()
            .map(|state| (state.store.len(), state.pending.len()))
            .unwrap_or_default();
        f.debug_struct("CoalescingCache")
            .field("loader", &self.inner.loader.name())
            .field("cached items", &cached)
            .field("running loads", &pending)
            .finish()
    }
}

impl Default for CoalescingCache<PlaceholderLoader> {
    fn default() -> Self {
        Self::new(PlaceholderLoader)
    }
}

impl<L: ExternalLoader> CoalescingCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// The loader backing this cache.
    pub fn loader(&self) -> &L {
        &self.inner.loader
    }

    /// Returns the value for `key`, loading it if necessary.
    ///
    /// If the key is cached, the cached value is returned without touching the loader.
    /// Otherwise the caller is queued up for the next load of the key, which is started unless
    /// one is already running.
    pub async fn get(&self, key: &str) -> LoadResult<L::Value> {
        let receiver = {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(value) = self.lookup(&state, key) {
                return Ok(value);
            }

            let (sender, receiver) = oneshot::channel();
            self.register(
                &mut state,
                key,
                Box::new(move |result| {
                    sender.send(result).ok();
                }),
            );
            receiver
        };

        // The sender is only dropped without sending if the runtime shuts down mid-load.
        receiver.await.unwrap_or(Err(LoadError::Canceled))
    }

    /// Like [`get`](Self::get), but delivers the result to `callback`.
    ///
    /// The callback is never invoked from within this call, not even on a cache hit: hits are
    /// scheduled as a separate task on the runtime, misses are queued up for the next load.
    pub fn get_with<F>(&self, key: &str, callback: F)
    where
        F: FnOnce(LoadResult<L::Value>) + Send + 'static,
    {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(value) = self.lookup(&state, key) {
            drop(state);
            tokio::spawn(async move { callback(Ok(value)) });
            return;
        }

        self.register(&mut state, key, Box::new(callback));
    }

    /// Starts loading `key` unless a load is already running.
    ///
    /// This does not consult the store, so it can be used to force a reload of a cached key
    /// in the background.
    pub fn ensure_loading(&self, key: &str) {
        let mut state = self.inner.state.lock().unwrap();
        self.ensure_loading_locked(&mut state, key);
    }

    /// Removes the cached value for `key`, so that the next request loads it again.
    ///
    /// A load that is currently running for `key` still completes and notifies its waiters,
    /// but its result is not stored. Returns whether a value was cached.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        let was_cached = state.store.has(key);
        state.store.del(key);
        if state.pending.is_pending(key) {
            state.stale.put(key, ());
        }
        drop(state);

        metric!(
            counter("caches.invalidation") += 1,
            "cache" => self.inner.loader.name(),
            "cached" => if was_cached { "true" } else { "false" },
        );
        tracing::debug!(key, was_cached, "Invalidated cache entry");
        was_cached
    }

    /// Whether a value for `key` is cached.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.state.lock().unwrap().store.has(key)
    }

    /// Whether a load for `key` is in flight.
    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.state.lock().unwrap().pending.is_pending(key)
    }

    /// All currently cached keys, in no particular order.
    pub fn cached_keys(&self) -> Vec<String> {
        let state = self.inner.state.lock().unwrap();
        state.store.keys().map(str::to_owned).collect()
    }

    fn lookup(&self, state: &CacheState<L::Value>, key: &str) -> Option<L::Value> {
        let name = self.inner.loader.name();
        metric!(counter("caches.access") += 1, "cache" => name);

        let value = state.store.get(key)?;
        metric!(counter("caches.memory.hit") += 1, "cache" => name);
        Some(value.clone())
    }

    fn register(&self, state: &mut CacheState<L::Value>, key: &str, waiter: Waiter<L::Value>) {
        state.waiters.entry_mut(key).push(waiter);
        self.ensure_loading_locked(state, key);
    }

    fn ensure_loading_locked(&self, state: &mut CacheState<L::Value>, key: &str) {
        let name = self.inner.loader.name();
        if state.pending.is_pending(key) {
            // A concurrent request was coalesced into the running load.
            metric!(counter("caches.channel.hit") += 1, "cache" => name);
            return;
        }

        state.pending.set_pending(key);
        metric!(counter("caches.computation") += 1, "cache" => name);
        tracing::trace!("Spawning deduplicated {} load for key {:?}", name, key);

        let this = self.clone();
        let key = key.to_owned();
        tokio::spawn(async move { this.load_and_cache(key).await });
    }

    /// Runs the loader for `key` and hands the result to everybody waiting for it.
    async fn load_and_cache(self, key: String) {
        let name = self.inner.loader.name();
        let result = AssertUnwindSafe(self.inner.loader.load(&key))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                tracing::error!(key = key.as_str(), "{} loader panicked", name);
                Err(LoadError::Canceled)
            });

        let waiters = {
            let mut state = self.inner.state.lock().unwrap();
            state.pending.unset_pending(&key);
            let stale = state.stale.take(&key).is_some();

            match &result {
                Ok(value) if !stale => state.store.put(key.as_str(), value.clone()),
                Ok(_) => tracing::debug!(key = key.as_str(), "Discarding result of invalidated load"),
                Err(err) => {
                    metric!(
                        counter("caches.load.error") += 1,
                        "cache" => name,
                        "error" => err.as_tag(),
                    );
                    tracing::debug!(key = key.as_str(), error = %err, "{} load failed", name);
                }
            }

            state.waiters.take(&key).unwrap_or_default()
        };

        for waiter in waiters {
            let result = result.clone();
            // A misbehaving waiter must not keep the others from being notified.
            if std::panic::catch_unwind(AssertUnwindSafe(move || waiter(result))).is_err() {
                tracing::error!(key = key.as_str(), "{} cache waiter panicked", name);
            }
        }
    }
}
