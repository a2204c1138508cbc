use rustc_hash::FxHashMap;

/// A plain in-memory mapping from string keys to values.
///
/// This is not synchronized in any way; the [`CoalescingCache`](super::CoalescingCache) keeps
/// it behind its own lock.
#[derive(Debug, Clone)]
pub struct KeyedStore<V> {
    entries: FxHashMap<String, V>,
}

impl<V> Default for KeyedStore<V> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<V> KeyedStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    /// Inserts `value` for `key`, replacing any previous value.
    pub fn put(&mut self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes the value for `key`. Does nothing if the key is absent.
    pub fn del(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Removes the value for `key` and hands it back.
    pub fn take(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key)
    }

    /// Returns a mutable reference to the value for `key`, inserting a default one first if
    /// the key is absent.
    pub fn entry_mut(&mut self, key: &str) -> &mut V
    where
        V: Default,
    {
        self.entries.entry(key.to_owned()).or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tracks the keys that currently have a load in flight.
///
/// A key is present exactly while a load for it has started and not yet completed.
#[derive(Debug, Clone, Default)]
pub struct PendingTracker {
    store: KeyedStore<bool>,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pending(&mut self, key: &str) {
        self.store.put(key, true);
    }

    pub fn unset_pending(&mut self, key: &str) {
        self.store.del(key);
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.store.has(key)
    }

    /// The number of loads currently in flight.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
